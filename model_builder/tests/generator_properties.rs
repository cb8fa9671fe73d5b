use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use pointing_model_builder::astro::{AtmosphericConditions, HorizonProfile, ObserverSite};
use pointing_model_builder::generator::{
    MeridianLimits, PointBounds, PointGenerator, SiderealPathRequest, MAX_PATH_POINTS,
};
use pointing_model_builder::models::{EquatorialCoordinates, ModelPointState};
use pointing_model_builder::ordering::PointOrdering;

fn generated(points: &[pointing_model_builder::ModelPoint]) -> usize {
    points
        .iter()
        .filter(|p| p.state == ModelPointState::Generated)
        .count()
}

proptest! {
    #[test]
    fn prop_open_sky_spiral_has_exact_count(n in 3usize..=100) {
        let points = PointGenerator::default().golden_spiral(n).unwrap();
        prop_assert_eq!(points.len(), n);
        prop_assert_eq!(generated(&points), n);
    }

    #[test]
    fn prop_spiral_positions_in_range(n in 1usize..=200) {
        let points = PointGenerator::default().golden_spiral(n).unwrap();
        for (i, p) in points.iter().enumerate() {
            prop_assert_eq!(p.id, i);
            prop_assert!((0.0..=90.0).contains(&p.altitude_deg()));
            prop_assert!((0.0..360.0).contains(&p.azimuth_deg()));
        }
    }

    #[test]
    fn prop_spiral_respects_bounds(
        min_alt in 0.0..40.0f64,
        alt_span in 20.0..50.0f64,
        min_az in 0.0..360.0f64,
        max_az in 0.0..360.0f64,
        n in 5usize..=40,
    ) {
        let bounds = PointBounds {
            min_altitude_deg: min_alt,
            max_altitude_deg: min_alt + alt_span,
            min_azimuth_deg: min_az,
            max_azimuth_deg: max_az,
        };
        let points = PointGenerator::new(bounds, HorizonProfile::flat())
            .golden_spiral(n)
            .unwrap();
        for p in &points {
            let inside = bounds.contains_altitude(p.altitude_deg())
                && bounds.contains_azimuth(p.azimuth_deg());
            prop_assert_eq!(p.state == ModelPointState::Generated, inside);
        }
    }

    #[test]
    fn prop_plan_visits_each_eligible_point_once(
        n in 3usize..=60,
        west_to_east in any::<bool>(),
        reversed in any::<bool>(),
    ) {
        let points = PointGenerator::default().golden_spiral(n).unwrap();
        let mut ordering = PointOrdering::new(west_to_east, false);
        if reversed {
            ordering = ordering.flipped();
        }
        let plan = ordering.plan(&points);
        let mut sorted = plan.clone();
        sorted.sort_unstable();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), plan.len());
        prop_assert_eq!(plan.len(), generated(&points));

        let azimuths: Vec<f64> = plan.iter().map(|&id| points[id].azimuth_deg()).collect();
        if ordering.is_ascending() {
            prop_assert!(azimuths.windows(2).all(|w| w[0] <= w[1]));
        } else {
            prop_assert!(azimuths.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_sidereal_path_is_capped(
        dec in -30.0..85.0f64,
        ra in 0.0..24.0f64,
        hours in 1i64..=12,
        ra_delta in 0.02..2.0f64,
    ) {
        let start = Utc.with_ymd_and_hms(2024, 9, 15, 21, 0, 0).unwrap();
        let request = SiderealPathRequest {
            target: EquatorialCoordinates::new(ra, dec),
            ra_delta_deg: ra_delta,
            start,
            end: start + Duration::hours(hours),
            site: ObserverSite::new(40.0, -3.7),
            conditions: AtmosphericConditions::default(),
            meridian_limits: MeridianLimits::default(),
        };
        let path = PointGenerator::default().sidereal_path(&request).unwrap();

        prop_assert!(path.valid_count() <= MAX_PATH_POINTS);
        prop_assert_eq!(path.attempted_deltas.first().copied(), Some(ra_delta));
        let last = path.attempted_deltas.last().copied();
        prop_assert_eq!(last, Some(path.ra_delta_deg));
        prop_assert!(path.attempted_deltas.windows(2).all(|w| w[1] > w[0]));
        for (i, p) in path.points.iter().enumerate() {
            prop_assert_eq!(p.id, i);
        }
    }
}
