//! Return recurrence and target construction.

use super::{buffer, catalog, targeted, transition, RecordingEstimator};
use crate::algorithms::returns::{bootstrap_value, discounted_returns, UpdateTargets};
use crate::algorithms::UpdateError;
use crate::config::ScreenResolution;
use crate::core::trajectory::TrajectoryBuffer;
use crate::core::transition::SpatialTarget;

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() < 1e-4,
            "index {}: expected {}, got {}",
            i,
            e,
            a
        );
    }
}

/// Rewards [1, 2, 3], bootstrap 10, discount 0.99.
/// Last step gets R, then 3 + 0.99*10 = 12.9, then 2 + 0.99*12.9 = 14.771.
#[test]
fn test_worked_example() {
    let returns = discounted_returns(&[1.0, 2.0, 3.0], 10.0, 0.99);
    assert_close(&returns, &[14.771, 12.9, 10.0]);
}

#[test]
fn test_first_reward_never_used() {
    let a = discounted_returns(&[100.0, 2.0, 3.0], 10.0, 0.99);
    let b = discounted_returns(&[-5.0, 2.0, 3.0], 10.0, 0.99);
    assert_eq!(a, b);
}

#[test]
fn test_single_step_is_bootstrap() {
    assert_eq!(discounted_returns(&[7.0], 4.0, 0.99), vec![4.0]);
    assert!(discounted_returns(&[], 4.0, 0.99).is_empty());
}

#[test]
fn test_zero_discount() {
    let returns = discounted_returns(&[1.0, 2.0, 3.0], 10.0, 0.0);
    assert_eq!(returns, vec![2.0, 3.0, 10.0]);
}

#[test]
fn test_build_bootstraps_from_estimator() {
    let estimator = RecordingEstimator::new(10.0);
    let buffer = buffer(vec![
        transition(1.0, false, 0),
        transition(2.0, false, 0),
        transition(3.0, false, 0),
    ]);

    let targets =
        UpdateTargets::build(&buffer, &estimator, &catalog(), ScreenResolution::new(2, 2), 0.99)
            .unwrap();

    assert_eq!(targets.bootstrap, 10.0);
    assert_close(&targets.returns, &[14.771, 12.9, 10.0]);
    assert_eq!(*estimator.predictions.lock(), 1);
}

#[test]
fn test_terminal_bootstrap_is_zero() {
    let estimator = RecordingEstimator::new(1_000.0);
    let buffer = buffer(vec![transition(1.0, false, 0), transition(2.0, true, 0)]);

    assert_eq!(bootstrap_value(&buffer, &estimator).unwrap(), 0.0);

    let targets =
        UpdateTargets::build(&buffer, &estimator, &catalog(), ScreenResolution::new(2, 2), 0.99)
            .unwrap();
    assert_eq!(targets.bootstrap, 0.0);
    assert_close(&targets.returns, &[2.0, 0.0]);
    assert_eq!(*estimator.predictions.lock(), 0);
}

#[test]
fn test_total_reward_is_undiscounted_sum() {
    let estimator = RecordingEstimator::new(50.0);
    let buffer = buffer(vec![
        transition(1.0, false, 0),
        transition(2.0, false, 0),
        transition(3.0, false, 0),
    ]);
    let targets =
        UpdateTargets::build(&buffer, &estimator, &catalog(), ScreenResolution::new(2, 2), 0.99)
            .unwrap();
    assert_eq!(targets.total_reward, 6.0);
}

#[test]
fn test_masks_and_one_hots() {
    let estimator = RecordingEstimator::new(0.0);
    let resolution = ScreenResolution::new(4, 2);
    let buffer = buffer(vec![transition(0.0, false, 0), targeted(0.0, 3, 1)]);

    let targets = UpdateTargets::build(&buffer, &estimator, &catalog(), resolution, 0.99).unwrap();

    assert_eq!(targets.len(), 2);
    assert_eq!(targets.legal_masks[0], vec![1.0, 1.0, 0.0]);
    assert_eq!(targets.action_one_hots[0], vec![1.0, 0.0, 0.0]);
    assert_eq!(targets.action_one_hots[1], vec![0.0, 1.0, 0.0]);

    assert_eq!(targets.has_spatial, vec![0.0, 1.0]);
    assert!(targets.spatial_one_hots[0].iter().all(|&v| v == 0.0));
    let hot: Vec<usize> = targets.spatial_one_hots[1]
        .iter()
        .enumerate()
        .filter(|(_, &v)| v == 1.0)
        .map(|(i, _)| i)
        .collect();
    // row 1, column 3 on a 4-wide grid
    assert_eq!(hot, vec![7]);
}

#[test]
fn test_target_ignored_for_untargeted_action() {
    let estimator = RecordingEstimator::new(0.0);
    let mut t = transition(0.0, true, 5);
    t.target = Some(SpatialTarget::new(0, 0));

    let targets = UpdateTargets::build(
        &buffer(vec![t]),
        &estimator,
        &catalog(),
        ScreenResolution::new(2, 2),
        0.99,
    )
    .unwrap();

    assert_eq!(targets.has_spatial, vec![0.0]);
    assert!(targets.spatial_one_hots[0].iter().all(|&v| v == 0.0));
}

#[test]
fn test_unknown_action_rejected() {
    let estimator = RecordingEstimator::new(0.0);
    let result = UpdateTargets::build(
        &buffer(vec![transition(0.0, true, 99)]),
        &estimator,
        &catalog(),
        ScreenResolution::new(2, 2),
        0.99,
    );
    assert_eq!(result.unwrap_err(), UpdateError::UnknownAction(99));
}

#[test]
fn test_out_of_bounds_target_rejected() {
    let estimator = RecordingEstimator::new(0.0);
    let mut t = targeted(0.0, 5, 0);
    t.terminal = true;
    let result = UpdateTargets::build(
        &buffer(vec![t]),
        &estimator,
        &catalog(),
        ScreenResolution::new(2, 2),
        0.99,
    );
    assert_eq!(
        result.unwrap_err(),
        UpdateError::TargetOutOfBounds { x: 5, y: 0 }
    );
}

#[test]
fn test_empty_trajectory_rejected() {
    let estimator = RecordingEstimator::new(0.0);
    assert_eq!(
        bootstrap_value(&TrajectoryBuffer::new(), &estimator).unwrap_err(),
        UpdateError::EmptyTrajectory
    );
}

#[test]
fn test_batch_view() {
    let estimator = RecordingEstimator::new(0.0);
    let buffer = buffer((0..5).map(|i| transition(i as f32, i == 4, 0)).collect());
    let targets =
        UpdateTargets::build(&buffer, &estimator, &catalog(), ScreenResolution::new(2, 2), 0.5)
            .unwrap();

    let batch = targets.batch(1..3);
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.returns, &targets.returns[1..3]);
    assert_eq!(batch.states[0].screen, vec![1.0]);
    assert!(batch.validate().is_ok());
}
