//! Discrete-time simulation of a vehicle travelling a job's leg.
//!
//! The vehicle moves along the straight line between pickup and delivery,
//! not along road geometry. Each call to [`advance`] moves it by the distance
//! covered at a freshly randomised speed over `dt`.

use std::time::Duration;

use rand::Rng;
use serde::Serialize;

use crate::entities::driver_location::TrackingStatus;
use crate::utils::geo::{bearing_degrees, Location};

pub const MIN_SPEED_MPH: f64 = 25.0;
pub const MAX_SPEED_MPH: f64 = 45.0;

/// Progress ratio at which the load counts as under way.
pub const IN_TRANSIT_THRESHOLD: f64 = 0.1;

/// Progress ratio at which the vehicle is reported as close to the drop-off.
pub const NEAR_DELIVERY_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingState {
    pub pickup: Location,
    pub delivery: Location,
    pub total_miles: f64,
    pub completed_miles: f64,
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
    pub speed_mph: f64,
    pub status: TrackingStatus,
}

impl TrackingState {
    /// Vehicle loaded at the pickup, nothing travelled yet
    pub fn start(pickup: Location, delivery: Location, total_miles: f64) -> Self {
        let heading = bearing_degrees(pickup.lat, pickup.lng, delivery.lat, delivery.lng);
        let total_miles = total_miles.max(0.0);
        let status = if total_miles == 0.0 {
            TrackingStatus::Delivered
        } else {
            TrackingStatus::PickedUp
        };

        Self {
            lat: pickup.lat,
            lng: pickup.lng,
            pickup,
            delivery,
            total_miles,
            completed_miles: 0.0,
            heading,
            speed_mph: 0.0,
            status,
        }
    }

    pub fn progress(&self) -> f64 {
        if self.total_miles <= 0.0 {
            return 1.0;
        }
        (self.completed_miles / self.total_miles).clamp(0.0, 1.0)
    }

    pub fn remaining_miles(&self) -> f64 {
        (self.total_miles - self.completed_miles).max(0.0)
    }

    /// Minutes to drop-off at the current displayed speed
    pub fn eta_minutes(&self) -> Option<f64> {
        if self.is_finished() {
            return Some(0.0);
        }
        (self.speed_mph > 0.0).then(|| self.remaining_miles() / self.speed_mph * 60.0)
    }

    pub fn is_finished(&self) -> bool {
        self.status == TrackingStatus::Delivered
    }
}

fn stage(status: TrackingStatus) -> u8 {
    match status {
        TrackingStatus::Available | TrackingStatus::Offline => 0,
        TrackingStatus::PickedUp => 1,
        TrackingStatus::InTransit => 2,
        TrackingStatus::NearDelivery => 3,
        TrackingStatus::Delivered => 4,
    }
}

/// Status label for a progress ratio
pub fn status_for_progress(progress: f64) -> TrackingStatus {
    if progress >= 1.0 {
        TrackingStatus::Delivered
    } else if progress >= NEAR_DELIVERY_THRESHOLD {
        TrackingStatus::NearDelivery
    } else if progress >= IN_TRANSIT_THRESHOLD {
        TrackingStatus::InTransit
    } else {
        TrackingStatus::PickedUp
    }
}

/// Advance the simulation by `dt`. Status only ever moves forward.
pub fn advance<R: Rng + ?Sized>(state: &TrackingState, dt: Duration, rng: &mut R) -> TrackingState {
    if state.is_finished() {
        return TrackingState {
            speed_mph: 0.0,
            ..state.clone()
        };
    }

    let speed_mph = rng.gen_range(MIN_SPEED_MPH..=MAX_SPEED_MPH);
    let travelled = speed_mph * dt.as_secs_f64() / 3600.0;
    let completed_miles = (state.completed_miles + travelled).min(state.total_miles);

    let mut next = TrackingState {
        completed_miles,
        speed_mph,
        ..state.clone()
    };

    let progress = next.progress();
    if progress >= 1.0 {
        next.lat = state.delivery.lat;
        next.lng = state.delivery.lng;
    } else {
        next.lat = state.pickup.lat + (state.delivery.lat - state.pickup.lat) * progress;
        next.lng = state.pickup.lng + (state.delivery.lng - state.pickup.lng) * progress;
    }

    let candidate = status_for_progress(progress);
    if stage(candidate) > stage(state.status) {
        next.status = candidate;
    }
    if next.status == TrackingStatus::Delivered {
        next.speed_mph = 0.0;
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn london_to_croydon(total_miles: f64) -> TrackingState {
        TrackingState::start(
            Location::new(51.5074, -0.1278),
            Location::new(51.3762, -0.0982),
            total_miles,
        )
    }

    #[test]
    fn test_starts_at_pickup() {
        let state = london_to_croydon(12.0);
        assert_eq!(state.status, TrackingStatus::PickedUp);
        assert_eq!(state.lat, 51.5074);
        assert_eq!(state.progress(), 0.0);
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(status_for_progress(0.0), TrackingStatus::PickedUp);
        assert_eq!(status_for_progress(0.099), TrackingStatus::PickedUp);
        assert_eq!(status_for_progress(0.1), TrackingStatus::InTransit);
        assert_eq!(status_for_progress(0.89), TrackingStatus::InTransit);
        assert_eq!(status_for_progress(0.9), TrackingStatus::NearDelivery);
        assert_eq!(status_for_progress(1.0), TrackingStatus::Delivered);
    }

    #[test]
    fn test_speed_stays_in_band() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = london_to_croydon(50.0);
        for _ in 0..100 {
            state = advance(&state, Duration::from_secs(3), &mut rng);
            assert!((MIN_SPEED_MPH..=MAX_SPEED_MPH).contains(&state.speed_mph));
        }
    }

    #[test]
    fn test_position_stays_on_straight_line() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut state = london_to_croydon(1.0);
        for _ in 0..20 {
            state = advance(&state, Duration::from_secs(30), &mut rng);
            let expected_lat = state.pickup.lat + (state.delivery.lat - state.pickup.lat) * state.progress();
            assert!((state.lat - expected_lat).abs() < 1e-12);
        }
    }

    #[test]
    fn test_near_delivery_never_reverts() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut state = london_to_croydon(2.0);
        let mut seen_near_delivery = false;
        let mut last_progress = 0.0;

        while !state.is_finished() {
            state = advance(&state, Duration::from_secs(3), &mut rng);
            assert!(state.progress() >= last_progress);
            last_progress = state.progress();

            if state.progress() >= NEAR_DELIVERY_THRESHOLD {
                seen_near_delivery = true;
            }
            if seen_near_delivery {
                assert!(matches!(
                    state.status,
                    TrackingStatus::NearDelivery | TrackingStatus::Delivered
                ));
            }
        }

        assert!(seen_near_delivery);
        assert_eq!(state.lat, state.delivery.lat);
        assert_eq!(state.eta_minutes(), Some(0.0));
    }

    #[test]
    fn test_status_does_not_regress_from_prior_state() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = london_to_croydon(100.0);
        state.status = TrackingStatus::NearDelivery;
        let next = advance(&state, Duration::from_secs(3), &mut rng);
        assert_eq!(next.status, TrackingStatus::NearDelivery);
    }

    #[test]
    fn test_zero_length_leg_is_delivered() {
        let mut rng = StdRng::seed_from_u64(1);
        let state = london_to_croydon(0.0);
        assert!(state.is_finished());
        let next = advance(&state, Duration::from_secs(3), &mut rng);
        assert_eq!(next, state);
    }

    #[test]
    fn test_eta_uses_remaining_distance() {
        let mut state = london_to_croydon(10.0);
        state.completed_miles = 4.0;
        state.speed_mph = 30.0;
        state.status = TrackingStatus::InTransit;
        let eta = state.eta_minutes().expect("moving vehicle has an eta");
        assert!((eta - 12.0).abs() < 1e-9);
    }
}
