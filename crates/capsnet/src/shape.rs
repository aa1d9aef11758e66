/// Calculate the output size of a convolution along one spatial dimension.
///
/// Follows the usual formula
/// `floor((size + 2 * padding - dilation * (kernel_size - 1) - 1) / stride) + 1`.
///
/// Returns `None` when the dilated kernel doesn't fit in the padded input or when the stride is
/// zero.
pub fn conv_output_size(
    size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Option<usize> {
    if stride == 0 || kernel_size == 0 || dilation == 0 {
        return None;
    }

    let padded = size + 2 * padding;
    let receptive_field = dilation * (kernel_size - 1) + 1;

    if receptive_field > padded {
        return None;
    }

    Some((padded - receptive_field) / stride + 1)
}

/// Same as [conv_output_size], applied to both spatial dimensions.
pub fn conv_output_size_2d(
    size: [usize; 2],
    kernel_size: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
    dilation: [usize; 2],
) -> Option<[usize; 2]> {
    let height = conv_output_size(size[0], kernel_size[0], stride[0], padding[0], dilation[0])?;
    let width = conv_output_size(size[1], kernel_size[1], stride[1], padding[1], dilation[1])?;

    Some([height, width])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_size_with_matching_padding() {
        assert_eq!(conv_output_size(28, 7, 1, 3, 1), Some(28));
        assert_eq!(conv_output_size(28, 5, 1, 4, 2), Some(28));
        assert_eq!(conv_output_size(28, 3, 1, 3, 3), Some(28));
    }

    #[test]
    fn strided_halves_the_size() {
        assert_eq!(conv_output_size(28, 5, 2, 2, 1), Some(14));
        assert_eq!(conv_output_size(14, 3, 2, 1, 1), Some(7));
    }

    #[test]
    fn kernel_larger_than_input() {
        assert_eq!(conv_output_size(2, 7, 1, 0, 1), None);
        assert_eq!(conv_output_size(4, 3, 1, 0, 3), None);
    }

    #[test]
    fn zero_stride() {
        assert_eq!(conv_output_size(28, 3, 0, 1, 1), None);
    }

    #[test]
    fn two_dimensions() {
        let size = conv_output_size_2d([28, 20], [5, 5], [2, 2], [2, 2], [1, 1]);

        assert_eq!(size, Some([14, 10]));
    }
}
