#[cfg(test)]
mod transform_tests {
    use mapcam::{FreeCameraOptions, LatLng, MercatorCoordinate, Point, Transform, TransformOptions};
    use nalgebra::Matrix4;

    fn transform(width: f64, height: f64) -> Transform {
        let mut tr = Transform::new(TransformOptions::default()).unwrap();
        tr.resize(width, height);
        tr
    }

    fn matrices_close(a: &Matrix4<f64>, b: &Matrix4<f64>) -> bool {
        (a - b).amax() <= 1e-9 * a.amax().max(1.0)
    }

    /// Setters clamp zoom and pitch to the configured ranges
    #[test]
    fn test_zoom_and_pitch_are_clamped() {
        let mut tr = transform(1024.0, 768.0);
        tr.set_zoom(30.0);
        assert_eq!(tr.zoom(), 22.0);

        tr.set_pitch(85.0);
        assert_eq!(tr.pitch(), 60.0);

        tr.set_bearing(190.0);
        assert!((tr.bearing() + 170.0).abs() < 1e-9);
    }

    /// Returning to a previous state reproduces its matrices
    #[test]
    fn test_matrices_depend_only_on_state() {
        let mut tr = transform(800.0, 600.0);
        tr.set_zoom(4.0);
        tr.set_pitch(30.0);
        let proj = *tr.proj_matrix();
        let pixel = *tr.pixel_matrix();

        tr.set_zoom(7.5);
        tr.set_pitch(50.0);
        assert!(!matrices_close(&proj, tr.proj_matrix()));

        tr.set_zoom(4.0);
        tr.set_pitch(30.0);
        assert!(matrices_close(&proj, tr.proj_matrix()));
        assert!(matrices_close(&pixel, tr.pixel_matrix()));
        assert!(tr.validate().is_ok());
    }

    /// Screen position and location convert back and forth
    #[test]
    fn test_location_point_round_trip() {
        let mut tr = transform(1024.0, 768.0);
        tr.set_zoom(5.0);
        tr.set_center(LatLng::new(20.0, 10.0));
        tr.set_pitch(45.0);
        tr.set_bearing(30.0);

        for ll in [LatLng::new(20.0, 10.0), LatLng::new(21.5, 12.0), LatLng::new(18.0, 7.0)] {
            let point = tr.location_point(&ll, None);
            let back = tr.point_location(&point);
            assert!((back.lat - ll.lat).abs() < 1e-6, "{:?} != {:?}", back, ll);
            assert!((back.lng - ll.lng).abs() < 1e-6, "{:?} != {:?}", back, ll);
        }

        let center = tr.point_location(&tr.center_point());
        assert!((center.lat - 20.0).abs() < 1e-6 && (center.lng - 10.0).abs() < 1e-6);
    }

    /// Latitudes past the mercator limit are pulled back and re-applying the
    /// constrained center changes nothing
    #[test]
    fn test_center_is_constrained() {
        let mut tr = transform(512.0, 512.0);
        tr.set_zoom(3.0);
        tr.set_center(LatLng::new(89.0, 0.0));
        let constrained = tr.center();
        assert!(constrained.lat < 85.06);

        tr.set_center(constrained);
        assert_eq!(tr.center(), constrained);
    }

    /// Points above the horizon fall back to the horizon line
    #[test]
    fn test_horizon_with_high_pitch() {
        let mut tr = transform(1024.0, 768.0);
        tr.set_max_pitch(85.0);
        tr.set_zoom(10.0);
        tr.set_pitch(85.0);
        assert!(tr.is_horizon_visible());
        assert!(tr.horizon_line_from_top(true) > 0.0);
        assert!(tr.is_point_above_horizon(&Point::new(512.0, 0.0)));
        assert!(!tr.is_point_above_horizon(&Point::new(512.0, 767.0)));
    }

    /// Reading the free camera and writing it back is a no-op, moving the
    /// camera up zooms out
    #[test]
    fn test_free_camera_options() {
        let mut tr = transform(1024.0, 768.0);
        tr.set_zoom(6.0);
        tr.set_center(LatLng::new(40.0, -70.0));

        let options = tr.get_free_camera_options();
        assert!(!tr.set_free_camera_options(&options));

        let position = options.position().unwrap();
        let raised = FreeCameraOptions::new(
            Some(MercatorCoordinate::new(position.x, position.y, position.z * 2.0)),
            options.orientation,
        );
        assert!(tr.set_free_camera_options(&raised));
        assert!(tr.zoom() < 6.0);
        assert!((tr.zoom() - 5.0).abs() < 1e-6);
    }

    /// A transform can be handed to another thread
    #[test]
    fn test_transform_is_send() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Transform>();

        let mut tr = transform(512.0, 512.0);
        tr.set_zoom(2.0);
        let clone = tr.clone();
        let zoom = std::thread::spawn(move || clone.zoom()).join().unwrap();
        assert_eq!(zoom, 2.0);
    }
}
