#[cfg(test)]
mod tests {
    use ndarray::Array1;
    use rstest::rstest;

    use crate::analysis::{
        DelineationMethod, Delineator, DetectorMethod, PeakDetector, PeakLabel,
    };
    use crate::mock::SyntheticEcg;

    /// Every expected peak has a detection within `tolerance` samples.
    fn matches_within(found: &[usize], expected: &[usize], tolerance: usize) -> bool {
        expected
            .iter()
            .all(|&e| found.iter().any(|&f| f.abs_diff(e) <= tolerance))
    }

    #[rstest]
    #[case(DetectorMethod::Neurokit)]
    #[case(DetectorMethod::PanTompkins)]
    #[case(DetectorMethod::Prominence)]
    #[case(DetectorMethod::Promac)]
    fn detects_r_peaks_on_clean_signal(#[case] method: DetectorMethod) {
        let ecg = SyntheticEcg::default();
        let signal = ecg.generate();

        let peaks = method.detect(signal.view(), ecg.sampling_rate).unwrap();

        assert_eq!(peaks.len(), ecg.r_peaks().len(), "{method:?} found {peaks:?}");
        assert!(matches_within(&peaks, &ecg.r_peaks(), 3), "{method:?} found {peaks:?}");
        assert!(peaks.windows(2).all(|w| w[0] < w[1]));
    }

    #[rstest]
    #[case(DetectorMethod::Neurokit)]
    #[case(DetectorMethod::PanTompkins)]
    #[case(DetectorMethod::Prominence)]
    #[case(DetectorMethod::Promac)]
    fn tolerates_mild_noise(#[case] method: DetectorMethod) {
        let ecg = SyntheticEcg {
            heart_rate: 75.0,
            duration: 20.0,
            ..Default::default()
        }
        .with_noise(0.005, 11);
        let signal = ecg.generate();

        let peaks = method.detect(signal.view(), ecg.sampling_rate).unwrap();

        let expected = ecg.r_peaks();
        assert!(
            peaks.len().abs_diff(expected.len()) <= 1,
            "{method:?} found {} of {} peaks",
            peaks.len(),
            expected.len()
        );
        assert!(matches_within(&peaks, &expected[1..expected.len() - 1], 5));
    }

    #[rstest]
    #[case(DetectorMethod::Neurokit)]
    #[case(DetectorMethod::PanTompkins)]
    #[case(DetectorMethod::Prominence)]
    #[case(DetectorMethod::Promac)]
    fn flat_signal_has_no_peaks(#[case] method: DetectorMethod) {
        let signal = Array1::<f64>::from_elem(900, 0.25);
        let peaks = method.detect(signal.view(), 300.0).unwrap();
        assert!(peaks.is_empty(), "{method:?} found {peaks:?}");
    }

    #[test]
    fn peak_delineation_orders_waves_around_r() {
        let ecg = SyntheticEcg::default();
        let signal = ecg.generate();
        let r_peaks = ecg.r_peaks();

        let waves = DelineationMethod::Peak
            .delineate(signal.view(), &r_peaks, ecg.sampling_rate)
            .unwrap();

        for label in [
            PeakLabel::PPeaks,
            PeakLabel::QPeaks,
            PeakLabel::SPeaks,
            PeakLabel::TPeaks,
            PeakLabel::POnsets,
            PeakLabel::TOffsets,
        ] {
            assert_eq!(waves.get(label).len(), r_peaks.len(), "{label:?}");
        }
        assert!(waves.get(PeakLabel::RPeaks).is_empty());

        for (i, &r) in r_peaks.iter().enumerate() {
            let p_onset = waves.get(PeakLabel::POnsets)[i];
            let p = waves.get(PeakLabel::PPeaks)[i];
            let q = waves.get(PeakLabel::QPeaks)[i];
            let s = waves.get(PeakLabel::SPeaks)[i];
            let t = waves.get(PeakLabel::TPeaks)[i];
            let t_offset = waves.get(PeakLabel::TOffsets)[i];
            assert!(p_onset < p && p < q && q < r, "beat {i}: {p_onset} {p} {q} {r}");
            assert!(r < s && s < t && t < t_offset, "beat {i}: {r} {s} {t} {t_offset}");

            // P at -200 ms, Q at -40 ms, S at +40 ms, T at +280 ms
            assert!(p.abs_diff(r - 60) <= 2);
            assert!(q.abs_diff(r - 12) <= 2);
            assert!(s.abs_diff(r + 12) <= 2);
            assert!(t.abs_diff(r + 84) <= 2);
        }
    }

    #[test]
    fn window_delineation_finds_each_wave() {
        let ecg = SyntheticEcg::default();
        let signal = ecg.generate();
        let r_peaks = ecg.r_peaks();

        let waves = DelineationMethod::Window
            .delineate(signal.view(), &r_peaks, ecg.sampling_rate)
            .unwrap();

        let q = waves.get(PeakLabel::QPeaks);
        let t = waves.get(PeakLabel::TPeaks);
        assert_eq!(q.len(), r_peaks.len());
        assert_eq!(t.len(), r_peaks.len());
        for (i, &r) in r_peaks.iter().enumerate() {
            assert!(q[i].abs_diff(r - 12) <= 2);
            assert!(t[i].abs_diff(r + 84) <= 2);
        }
    }
}
