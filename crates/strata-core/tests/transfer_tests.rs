#[cfg(test)]
mod tests {
    use strata::{
        copy, copy_device_to_device, copy_to_device, copy_to_host, shape, Array, ArrayError,
        Device, DeviceRequest, HostAllocator, Location,
    };

    thread_local! {
        static GPU_DEVICE: Option<Device> = Device::request_device(DeviceRequest::GPU).ok();
    }

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// The shared GPU, or `None` on machines without an adapter.
    fn gpu() -> Option<Device> {
        init();
        let device = GPU_DEVICE.with(|d| d.clone());
        if device.is_none() {
            log::warn!("No GPU adapter available, skipping device test");
        }
        device
    }

    #[test]
    fn test_round_trip() -> anyhow::Result<()> {
        let Some(device) = gpu() else { return Ok(()) };

        let host = Array::<i32>::from_slice(&[1, 2, 3, 4, 5], [5], &HostAllocator)?;
        let mut on_device = Array::<i32>::with_shape([5], &device)?.into_raw();
        assert_eq!(on_device.location(), Some(Location::Device));
        assert!(on_device.as_ptr().is_null());
        copy_to_device(&mut on_device, &host)?;

        let mut back = Array::<i32>::with_shape([5], &HostAllocator)?.into_raw();
        copy_to_host(&mut back, &on_device)?;
        let back = Array::<i32>::try_from_raw(back)?;
        assert_eq!(back.to_vec()?, vec![1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn test_from_array_crosses_devices() -> anyhow::Result<()> {
        let Some(device) = gpu() else { return Ok(()) };

        let data: Vec<f32> = (0..24).map(|x| x as f32 * 0.5).collect();
        let host = Array::from_slice(&data, [2, 3, 4], &HostAllocator)?;
        let on_device = Array::from_array(&host, &device)?;
        assert_eq!(on_device.shape(), &shape![2, 3, 4]);
        assert_eq!(on_device.to_vec()?, data);

        let back = Array::from_array(&on_device, &HostAllocator)?;
        assert_eq!(back.to_vec()?, data);
        assert_eq!(back.get(&[1, 2, 3])?, 11.5);
        Ok(())
    }

    #[test]
    fn test_device_zeros() -> anyhow::Result<()> {
        let Some(device) = gpu() else { return Ok(()) };

        let zeros = Array::<u32>::zeros([7], &device)?;
        assert_eq!(zeros.to_vec()?, vec![0; 7]);
        Ok(())
    }

    #[test]
    fn test_strided_host_view_to_device() -> anyhow::Result<()> {
        let Some(device) = gpu() else { return Ok(()) };

        let data: Vec<i16> = (0..12).collect();
        let host = Array::from_slice(&data, [3, 4], &HostAllocator)?;
        let view = host.slice_2d(1, 1, 3, 3)?;
        let on_device = Array::from_array(&view, &device)?;
        assert_eq!(on_device.to_vec()?, vec![4, 5, 7, 8]);
        Ok(())
    }

    #[test]
    fn test_unaligned_device_window() -> anyhow::Result<()> {
        let Some(device) = gpu() else { return Ok(()) };

        let data: Vec<u8> = (1..=11).collect();
        let host = Array::from_slice(&data, [11], &HostAllocator)?;
        let on_device = Array::from_array(&host, &device)?;

        let mut window = on_device.slice_1d(3, 6)?.into_raw();
        assert_eq!(window.offset(), 3);
        let patch = Array::<u8>::from_slice(&[30, 40, 50], [3], &HostAllocator)?;
        copy_to_device(&mut window, &patch)?;

        let window = Array::<u8>::try_from_raw(window)?;
        assert_eq!(window.to_vec()?, vec![30, 40, 50]);
        assert_eq!(
            on_device.to_vec()?,
            vec![1, 2, 3, 30, 40, 50, 7, 8, 9, 10, 11]
        );
        Ok(())
    }

    #[test]
    fn test_device_to_device_copy() -> anyhow::Result<()> {
        let Some(device) = gpu() else { return Ok(()) };

        let src = Array::<f32>::from_slice(&[1., 2., 3., 4.], [4], &device)?;
        let mut dst = Array::<f32>::zeros([4], &device)?.into_raw();
        let submission = copy_device_to_device(&mut dst, &src)?;
        submission.wait();
        assert_eq!(Array::<f32>::try_from_raw(dst)?.to_vec()?, vec![1., 2., 3., 4.]);

        // A device-wide barrier also covers submissions nobody waited on.
        let mut again = Array::<f32>::zeros([4], &device)?.into_raw();
        let _pending = copy_device_to_device(&mut again, &src)?;
        device.synchronize();
        assert_eq!(Array::<f32>::try_from_raw(again)?.to_vec()?, vec![1., 2., 3., 4.]);
        Ok(())
    }

    #[test]
    fn test_device_to_device_rejects_misaligned() -> anyhow::Result<()> {
        let Some(device) = gpu() else { return Ok(()) };

        let src = Array::<u8>::from_slice(&[1, 2, 3, 4, 5, 6, 7, 8], [8], &device)?;
        let dst = Array::<u8>::zeros([8], &device)?;
        let mut window = dst.slice_1d(1, 5)?.into_raw();
        let src_window = src.slice_1d(0, 4)?;
        assert!(matches!(
            copy_device_to_device(&mut window, &src_window),
            Err(ArrayError::Misaligned { offset: 1, .. })
        ));

        // The blocking copy falls back to staging through the host.
        copy(&mut window, &src_window)?;
        assert_eq!(dst.to_vec()?, vec![0, 1, 2, 3, 4, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_copy_between_views_of_one_buffer() -> anyhow::Result<()> {
        let Some(device) = gpu() else { return Ok(()) };

        let array = Array::<u32>::from_slice(&[1, 2, 3, 4, 0, 0, 0, 0], [8], &device)?;
        let head = array.slice_1d(0, 4)?;
        let mut tail = array.slice_1d(4, 8)?.into_raw();
        copy(&mut tail, &head)?;
        assert_eq!(array.to_vec()?, vec![1, 2, 3, 4, 1, 2, 3, 4]);

        // Overlapping ranges read the source as it was before the copy.
        let src = array.slice_1d(0, 6)?;
        let mut dst = array.slice_1d(2, 8)?.into_raw();
        copy_device_to_device(&mut dst, &src)?.wait();
        assert_eq!(array.to_vec()?, vec![1, 2, 1, 2, 3, 4, 1, 2]);
        Ok(())
    }

    #[test]
    fn test_deep_clone_on_device() -> anyhow::Result<()> {
        let Some(device) = gpu() else { return Ok(()) };

        let a = Array::<i64>::from_slice(&[5, 6, 7], [3], &device)?;
        let b = a.deep_clone()?;
        assert!(!b.shares_buffer(&a));
        assert_eq!(b.location(), Some(Location::Device));
        assert_eq!(b.to_vec()?, vec![5, 6, 7]);
        Ok(())
    }

    #[test]
    fn test_set_size_keeps_device_buffer() -> anyhow::Result<()> {
        let Some(device) = gpu() else { return Ok(()) };

        let mut array = Array::<f32>::with_shape([4, 4], &device)?;
        let id = array.buffer().map(|b| b.id());
        array.set_size([4, 4], &device)?;
        assert_eq!(array.buffer().map(|b| b.id()), id);
        array.set_size([16], &device)?;
        assert_ne!(array.buffer().map(|b| b.id()), id);
        Ok(())
    }

    #[test]
    fn test_device_element_access_is_rejected() -> anyhow::Result<()> {
        let Some(device) = gpu() else { return Ok(()) };

        let array = Array::<u32>::zeros([2], &device)?;
        assert!(matches!(array.get(&[0]), Err(ArrayError::Device(_))));
        assert!(array.iter().is_err());
        Ok(())
    }

    #[test]
    fn test_device_byte_size_mismatch() -> anyhow::Result<()> {
        let Some(device) = gpu() else { return Ok(()) };

        let host = Array::<u32>::from_slice(&[1, 2, 3], [3], &HostAllocator)?;
        let mut on_device = Array::<u32>::zeros([4], &device)?.into_raw();
        assert!(matches!(
            copy_to_device(&mut on_device, &host),
            Err(ArrayError::ByteSizeMismatch { dst: 16, src: 12 })
        ));
        let on_device = Array::<u32>::try_from_raw(on_device)?;
        assert_eq!(on_device.to_vec()?, vec![0; 4]);
        Ok(())
    }
}
