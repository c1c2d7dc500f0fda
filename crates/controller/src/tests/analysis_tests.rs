use super::*;

use shared::domain::GroundControlPoint;
use storage::ShotReprojection;

fn results_with_errors(errors: Vec<(&str, Vec<(&str, f64)>)>) -> AnalysisResults {
    let mut reprojections = Reprojections::new();
    for (point, shots) in errors {
        let per_shot = shots
            .into_iter()
            .map(|(shot, error)| (ShotId::from(shot), ShotReprojection { error }))
            .collect();
        reprojections.insert(PointId::from(point), per_shot);
    }
    AnalysisResults {
        shot_std: HashMap::new(),
        reprojections,
    }
}

fn store_with(ids: &[&str]) -> PointStore {
    let mut store = PointStore::new();
    store.replace_all(
        ids.iter()
            .map(|id| GroundControlPoint::empty(PointId::from(*id)))
            .collect(),
    );
    store
}

#[test]
fn freshness_guard_uses_thirty_second_window() {
    assert_eq!(check_save_freshness(Some(Duration::from_secs(10))), Ok(()));
    assert_eq!(check_save_freshness(Some(Duration::from_secs(30))), Ok(()));
    assert_eq!(
        check_save_freshness(Some(Duration::from_secs(40))),
        Err(RefusalReason::NotSavedRecently {
            elapsed: Duration::from_secs(40)
        })
    );
    assert_eq!(check_save_freshness(None), Err(RefusalReason::NeverSaved));
}

#[test]
fn pair_resolution_drops_no_reconstruction_choice() {
    // two reconstructions plus the trailing "None (3d-to-2d)" option
    assert_eq!(resolve_pair(0, Some(1), 3), ReconstructionPair::new(0, Some(1)));
    assert_eq!(resolve_pair(0, Some(2), 3), ReconstructionPair::new(0, None));
    assert_eq!(resolve_pair(1, None, 3), ReconstructionPair::new(1, None));
    assert_eq!(resolve_pair(0, Some(1), 1), ReconstructionPair::new(0, None));
}

#[test]
fn request_arguments_follow_runner_flags() {
    let request = AnalysisRequest {
        project_path: PathBuf::from("/data/site"),
        pair: ReconstructionPair::new(0, Some(1)),
        rigid: true,
        covariance: false,
    };
    let args: Vec<String> = request
        .arguments()
        .into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    assert_eq!(args, vec!["/data/site", "--rec_a", "0", "--rec_b", "1", "--rigid"]);

    let request = AnalysisRequest {
        pair: ReconstructionPair::new(2, None),
        rigid: false,
        covariance: true,
        ..request
    };
    let args: Vec<String> = request
        .arguments()
        .into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    assert_eq!(args, vec!["/data/site", "--rec_a", "2", "--covariance"]);
}

#[test]
fn process_command_line_puts_script_first() {
    let runner = ProcessAnalysisRunner::new("python3", Some(PathBuf::from("run_ba.py")));
    let request = AnalysisRequest {
        project_path: PathBuf::from("proj"),
        pair: ReconstructionPair::new(0, None),
        rigid: false,
        covariance: false,
    };
    let line: Vec<String> = runner
        .command_line(&request)
        .into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    assert_eq!(line, vec!["python3", "run_ba.py", "proj", "--rec_a", "0"]);
}

#[test]
fn worst_point_has_largest_error() {
    let results = results_with_errors(vec![
        ("p1", vec![("s1", 0.4)]),
        ("p2", vec![("s1", 1.8)]),
        ("p3", vec![("s2", 0.9)]),
    ]);
    let store = store_with(&["p1", "p2", "p3"]);
    assert_eq!(results.worst_point(&store), Some(PointId::from("p2")));
}

#[test]
fn worst_point_ties_go_to_smallest_id_and_skip_removed_points() {
    let results = results_with_errors(vec![
        ("b", vec![("s1", 2.0)]),
        ("a", vec![("s1", 2.0)]),
        ("z", vec![("s1", 9.0)]),
    ]);
    let store = store_with(&["a", "b"]);
    assert_eq!(results.worst_point(&store), Some(PointId::from("a")));
}

#[test]
fn point_error_is_max_over_shots() {
    let results = results_with_errors(vec![("p1", vec![("s1", 0.5), ("s2", 3.0), ("s3", 1.0)])]);
    assert_eq!(results.point_error(&PointId::from("p1")), Some(3.0));
    assert_eq!(results.point_error(&PointId::from("p9")), None);
}

#[test]
fn shot_with_max_error_is_limited_to_given_shots() {
    let results = results_with_errors(vec![("p1", vec![("s1", 0.5), ("s2", 3.0), ("s3", 1.0)])]);
    let shots = vec![ShotId::from("s1"), ShotId::from("s3"), ShotId::from("s4")];
    assert_eq!(
        results.shot_with_max_error(&PointId::from("p1"), &shots),
        Some(ShotId::from("s3"))
    );
    assert_eq!(
        results.shot_with_max_error(&PointId::from("p1"), &[ShotId::from("s4")]),
        None
    );
}

#[test]
fn cache_entries_are_kept_per_pair() {
    let mut cache = AnalysisResultCache::default();
    let first = ReconstructionPair::new(0, Some(1));
    let second = ReconstructionPair::new(0, None);

    cache.replace(first, results_with_errors(vec![("p1", vec![("s1", 1.0)])]));
    cache.replace(second, results_with_errors(vec![("p2", vec![("s1", 2.0)])]));
    cache.replace(first, results_with_errors(vec![("p3", vec![("s1", 3.0)])]));

    assert_eq!(cache.pairs(), vec![second, first]);
    let first_results = cache.get(first).expect("first");
    assert!(first_results
        .reprojections
        .contains_key(&PointId::from("p3")));
    assert!(!first_results
        .reprojections
        .contains_key(&PointId::from("p1")));
    assert!(cache
        .get(second)
        .expect("second")
        .reprojections
        .contains_key(&PointId::from("p2")));
}
