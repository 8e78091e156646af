//! Property tests for actuation clamping, frame encoding and log wraparound.

use proptest::prelude::*;

use rts_control::control::algorithm::{ACTUATION_LIMIT, clamp_actuation};
use rts_control::protocol::packet::{Frame, pack, unpack};
use rts_control::scheduler::{DataLogger, LogRow};

fn row(i: usize) -> LogRow {
    LogRow {
        timestamp: i as f64,
        measurement1: i as f64 * 2.0,
        ..LogRow::default()
    }
}

proptest! {
    #[test]
    fn clamp_stays_in_range_and_keeps_sign(value in -1.0e6f64..1.0e6) {
        let clamped = clamp_actuation(value);
        prop_assert!(clamped.abs() <= ACTUATION_LIMIT);
        if value.abs() <= ACTUATION_LIMIT {
            prop_assert_eq!(clamped, value);
        } else {
            prop_assert_eq!(clamped, ACTUATION_LIMIT.copysign(value));
        }
    }

    #[test]
    fn scalar_frames_survive_encoding(i in any::<i32>(), f in -1.0e30f32..1.0e30, s in ".{0,64}") {
        for frame in [Frame::Integer(i), Frame::Float(f), Frame::String(s.clone())] {
            let decoded = unpack(&pack(&frame).unwrap()).unwrap();
            prop_assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn logger_keeps_newest_rows_after_wrap(capacity in 1usize..64, extra in 0usize..200) {
        // duration / period = capacity
        let mut logger = DataLogger::new(capacity as f64 * 0.01, 0.01).unwrap();
        prop_assert_eq!(logger.capacity(), capacity);

        let total = capacity + extra;
        for i in 0..total {
            logger.append(row(i));
        }

        let snapshot = logger.snapshot();
        prop_assert_eq!(snapshot.len(), capacity);
        let first = total - capacity;
        for (k, r) in snapshot.iter().enumerate() {
            prop_assert_eq!(r.timestamp, (first + k) as f64);
        }
        prop_assert_eq!(logger.page(), (total / capacity) as u64);
    }

    #[test]
    fn logger_partial_fill_is_in_order(capacity in 2usize..64, written in 0usize..64) {
        let mut logger = DataLogger::new(capacity as f64 * 0.01, 0.01).unwrap();
        let written = written.min(capacity - 1);
        for i in 0..written {
            logger.append(row(i));
        }
        let snapshot = logger.snapshot();
        prop_assert_eq!(snapshot.len(), written);
        prop_assert!(snapshot.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
    }
}
