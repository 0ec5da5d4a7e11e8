use crate::{gpu::Align, ArrayError, DeviceError, Location, RawArray, Submission};

fn location_of(array: &RawArray) -> Result<Location, ArrayError> {
    array.location().ok_or(ArrayError::Unbound)
}

fn expect_location(array: &RawArray, expected: Location) -> Result<(), ArrayError> {
    let actual = location_of(array)?;
    if actual != expected {
        return Err(DeviceError::DeviceMismatch(label(expected), label(actual)).into());
    }
    Ok(())
}

fn label(location: Location) -> String {
    match location {
        Location::Host => "CPU",
        Location::Device => "GPU",
    }
    .to_string()
}

fn check_byte_sizes(dst: &RawArray, src: &RawArray) -> Result<(), ArrayError> {
    if dst.byte_size() != src.byte_size() {
        return Err(ArrayError::ByteSizeMismatch {
            dst: dst.byte_size(),
            src: src.byte_size(),
        });
    }
    Ok(())
}

fn check_contiguous(array: &RawArray) -> Result<(), ArrayError> {
    if !array.is_contiguous() {
        return Err(ArrayError::NonContiguous);
    }
    Ok(())
}

/// Uploads the elements of the host array `src` into the device array `dst`.
///
/// Blocks until the data has landed. `src` may be any strided view and is
/// read in column-major order. `dst` must be contiguous.
pub fn copy_to_device(dst: &mut RawArray, src: &RawArray) -> Result<(), ArrayError> {
    expect_location(dst, Location::Device)?;
    expect_location(src, Location::Host)?;
    check_byte_sizes(dst, src)?;
    check_contiguous(dst)?;

    log::debug!(
        "Uploading {} bytes {} -> {}",
        src.byte_size(),
        src.shape(),
        dst.shape()
    );
    dst.write_bytes(&src.to_bytes()?)
}

/// Downloads the elements of the device array `src` into the host array `dst`.
///
/// Blocks until the data is on the host. `src` must be contiguous, `dst` may
/// be any strided view.
pub fn copy_to_host(dst: &mut RawArray, src: &RawArray) -> Result<(), ArrayError> {
    expect_location(dst, Location::Host)?;
    expect_location(src, Location::Device)?;
    check_byte_sizes(dst, src)?;
    check_contiguous(src)?;

    log::debug!(
        "Downloading {} bytes {} -> {}",
        src.byte_size(),
        src.shape(),
        dst.shape()
    );
    dst.write_bytes(&src.to_bytes()?)
}

/// Copies the elements of `src` into `dst`, wherever either lives.
///
/// Blocking. Device to device copies stay on the device when the layout
/// allows it and go through the host otherwise.
pub fn copy(dst: &mut RawArray, src: &RawArray) -> Result<(), ArrayError> {
    match (location_of(dst)?, location_of(src)?) {
        (Location::Device, Location::Host) => copy_to_device(dst, src),
        (Location::Host, Location::Device) => copy_to_host(dst, src),
        (Location::Host, Location::Host) => {
            check_byte_sizes(dst, src)?;
            dst.write_bytes(&src.to_bytes()?)
        }
        (Location::Device, Location::Device) => {
            check_byte_sizes(dst, src)?;
            if device_copy_eligible(dst, src)? {
                copy_device_to_device(dst, src)?.wait();
                Ok(())
            } else {
                log::debug!("Device copy of {} bytes staged through host", src.byte_size());
                dst.write_bytes(&src.to_bytes()?)
            }
        }
    }
}

/// Enqueues a copy of `src` into `dst`, both in device memory, and returns
/// without waiting.
///
/// Both arrays must be contiguous, live on the same device, and start on a
/// copy aligned offset. The length must be copy aligned too, unless `dst`
/// runs to the end of its buffer. Views of the same buffer are copied through
/// a temporary device buffer. Nothing is visible until the returned
/// [`Submission`] has been waited on.
pub fn copy_device_to_device(
    dst: &mut RawArray,
    src: &RawArray,
) -> Result<Submission, ArrayError> {
    expect_location(dst, Location::Device)?;
    expect_location(src, Location::Device)?;
    check_byte_sizes(dst, src)?;
    check_contiguous(dst)?;
    check_contiguous(src)?;

    let src_block = src.device_block()?;
    let dst_block = dst.device_block()?;
    if src_block.device() != dst_block.device() {
        return Err(DeviceError::DeviceMismatch(
            format!("{:?}", dst_block.device()),
            format!("{:?}", src_block.device()),
        )
        .into());
    }
    for offset in [src.offset(), dst.offset()] {
        if !offset.is_copy_aligned() {
            return Err(ArrayError::Misaligned {
                offset,
                align: usize::COPY_BUFFER_ALIGNMENT,
            });
        }
    }
    let len = src.byte_size();
    if !len.is_copy_aligned() && dst.offset() + len != dst_block.n_bytes() {
        return Err(ArrayError::Misaligned {
            offset: dst.offset() + len,
            align: usize::COPY_BUFFER_ALIGNMENT,
        });
    }

    if dst.shares_buffer(src) {
        // wgpu rejects copies within one buffer.
        let staging = RawArray::with_shape(src.item_size(), src.shape(), src_block.device())?;
        // Submissions on one queue complete in order.
        let _ = enqueue_copy(&staging, src)?;
        return enqueue_copy(dst, &staging);
    }
    enqueue_copy(dst, src)
}

fn enqueue_copy(dst: &RawArray, src: &RawArray) -> Result<Submission, ArrayError> {
    let len = src.byte_size();
    log::debug!(
        "Enqueueing device copy of {} bytes {:?} -> {:?}",
        len,
        src.buffer().map(|b| b.id()),
        dst.buffer().map(|b| b.id())
    );
    let mut submission = src.device_block()?.copy_to(
        src.offset(),
        dst.device_block()?,
        dst.offset(),
        len.align_for_copy(),
    );
    for buffer in [src.buffer(), dst.buffer()].into_iter().flatten() {
        submission = submission.retain(buffer.clone());
    }
    Ok(submission)
}

fn device_copy_eligible(dst: &RawArray, src: &RawArray) -> Result<bool, ArrayError> {
    if !dst.is_contiguous() || !src.is_contiguous() {
        return Ok(false);
    }
    let (src_block, dst_block) = (src.device_block()?, dst.device_block()?);
    let len = src.byte_size();
    Ok(src_block.device() == dst_block.device()
        && src.offset().is_copy_aligned()
        && dst.offset().is_copy_aligned()
        && (len.is_copy_aligned() || dst.offset() + len == dst_block.n_bytes()))
}
