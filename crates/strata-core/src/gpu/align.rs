///WebGPU is very specific about buffer alignment.
///Since any device buffer may be copied back to the host, every device buffer has a size
///that is a multiple of COPY_BUFFER_ALIGNMENT (4 bytes), and every buffer-to-buffer copy
///starts and ends on that alignment.
///
///The `Align` trait provides methods to calculate the alignment of a usize, and to align a usize
pub trait Align {
    const COPY_BUFFER_ALIGNMENT: usize = wgpu::COPY_BUFFER_ALIGNMENT as usize;

    fn calculate_alignment(&self, alignment: usize) -> usize;
    fn align_for_copy(&self) -> usize;
    fn is_copy_aligned(&self) -> bool;
}

impl Align for usize {
    fn calculate_alignment(&self, alignment: usize) -> usize {
        let remainder = self % alignment;
        if remainder == 0 {
            0
        } else {
            alignment - remainder
        }
    }

    fn align_for_copy(&self) -> usize {
        self + self.calculate_alignment(Self::COPY_BUFFER_ALIGNMENT)
    }

    fn is_copy_aligned(&self) -> bool {
        self % Self::COPY_BUFFER_ALIGNMENT == 0
    }
}

#[cfg(test)]
mod tests {
    use super::Align;

    #[test]
    fn test_align_for_copy() {
        assert_eq!(0usize.align_for_copy(), 0);
        assert_eq!(1usize.align_for_copy(), 4);
        assert_eq!(4usize.align_for_copy(), 4);
        assert_eq!(13usize.align_for_copy(), 16);
        assert!(8usize.is_copy_aligned());
        assert!(!6usize.is_copy_aligned());
    }
}
