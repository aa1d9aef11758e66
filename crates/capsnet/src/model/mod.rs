mod fashion_mnist;
mod squash_capsule_net;

pub use fashion_mnist::*;
pub use squash_capsule_net::*;
