use super::*;

use shared::domain::{GeodeticPosition, Observation};
use tempfile::TempDir;

fn observation(shot: &str, x: f64, y: f64) -> Observation {
    Observation {
        shot_id: ShotId::from(shot),
        projection: [x, y],
        point: None,
    }
}

fn sample_points() -> Vec<GroundControlPoint> {
    vec![
        GroundControlPoint {
            id: PointId::from("b"),
            observations: vec![observation("s2", 0.5, 0.25), observation("s1", 0.1, 0.2)],
            position: Some(GeodeticPosition {
                latitude: 52.5,
                longitude: 13.4,
                altitude: 34.0,
            }),
        },
        GroundControlPoint::empty(PointId::from("a")),
    ]
}

#[test]
fn saved_points_load_back_sorted_with_observation_order_kept() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(POINTS_FILE_NAME);

    save_points(&path, &sample_points()).expect("save");
    let loaded = load_points(&path).expect("load");

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].id, PointId::from("a"));
    assert_eq!(loaded[1].id, PointId::from("b"));
    assert_eq!(
        loaded[1].observations,
        vec![observation("s2", 0.5, 0.25), observation("s1", 0.1, 0.2)]
    );
    assert_eq!(loaded[1].position, sample_points()[0].position);
}

#[test]
fn mirror_path_is_named_after_parent_directory() {
    let path = Path::new("/data/site_a/ground_control_points.json");
    assert_eq!(
        mirror_path(path),
        Some(PathBuf::from("/data/site_a/site_a.json"))
    );
    assert_eq!(mirror_path(Path::new("/points.json")), None);
}

#[test]
fn mirror_path_resolves_working_directory_parent() {
    let cwd = std::env::current_dir().expect("cwd");
    let dirname = cwd
        .file_name()
        .and_then(|name| name.to_str())
        .expect("cwd name");

    let storage = Storage::new(".");
    assert_eq!(
        mirror_path(&storage.points_path()),
        Some(Path::new(".").join(format!("{dirname}.json")))
    );
    assert_eq!(
        mirror_path(Path::new(POINTS_FILE_NAME)),
        Some(Path::new(".").join(format!("{dirname}.json")))
    );
}

#[test]
fn save_with_mirror_writes_identical_copies() {
    let dir = TempDir::new().expect("tempdir");
    let project = dir.path().join("quarry");
    let path = project.join(POINTS_FILE_NAME);

    let written = save_points_with_mirror(&path, &sample_points()).expect("save");

    assert_eq!(written, vec![path.clone(), project.join("quarry.json")]);
    let primary = fs::read_to_string(&path).expect("primary");
    let mirror = fs::read_to_string(project.join("quarry.json")).expect("mirror");
    assert_eq!(primary, mirror);
}

#[test]
fn missing_points_file_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    assert!(load_points(&dir.path().join("absent.json")).is_err());
}

#[test]
fn shot_std_table_parses_lines_and_skips_blanks() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("shots_std_0x1.csv");
    fs::write(&path, "s1,0.5\n\ns2, 1.25\n").expect("write");

    let table = load_shot_std(&path).expect("table");
    assert_eq!(table.len(), 2);
    assert_eq!(table[&ShotId::from("s1")], 0.5);
    assert_eq!(table[&ShotId::from("s2")], 1.25);
}

#[test]
fn shot_std_table_rejects_bad_values() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("shots_std_0x1.csv");
    fs::write(&path, "s1,not-a-number\n").expect("write");

    let err = load_shot_std(&path).expect_err("bad value");
    assert!(err.to_string().contains("invalid std value"));
}

#[test]
fn missing_analysis_output_reads_as_empty() {
    let dir = TempDir::new().expect("tempdir");
    let storage = Storage::new(dir.path());

    let output = storage
        .load_analysis_output(ReconstructionPair::DEFAULT)
        .expect("output");
    assert_eq!(output, AnalysisOutput::default());
}

#[test]
fn analysis_output_is_read_from_pair_tagged_files() {
    let dir = TempDir::new().expect("tempdir");
    let storage = Storage::new(dir.path());
    let pair = ReconstructionPair::new(2, None);
    fs::write(storage.shot_std_path(pair), "s1,0.3\n").expect("std");
    fs::write(
        storage.reprojections_path(pair),
        r#"{"p1": {"s1": {"error": 2.5, "reprojection": [0.1, 0.2]}}}"#,
    )
    .expect("reprojections");

    assert!(storage
        .shot_std_path(pair)
        .ends_with("shots_std_2xNone.csv"));

    let output = storage.load_analysis_output(pair).expect("output");
    assert_eq!(output.shot_std[&ShotId::from("s1")], 0.3);
    assert_eq!(
        output.reprojections[&PointId::from("p1")][&ShotId::from("s1")].error,
        2.5
    );
}

#[test]
fn reconstruction_options_count_shots_per_camera() {
    let dir = TempDir::new().expect("tempdir");
    let storage = Storage::new(dir.path());
    fs::write(
        storage.reconstruction_path(),
        r#"[
            {"shots": {"a": {"camera": "phone"}, "b": {"camera": "gopro"}, "c": {"camera": "phone"}}},
            {"shots": {"d": {"camera": "gopro"}}}
        ]"#,
    )
    .expect("reconstruction");

    let options = storage.load_reconstruction_options().expect("options");
    let labels: Vec<String> = options.iter().map(ReconstructionOption::label).collect();
    assert_eq!(
        labels,
        vec![
            "REC#0: gopro(1), phone(2)".to_string(),
            "REC#1: gopro(1)".to_string(),
            "None (3d-to-2d)".to_string(),
        ]
    );
}

#[test]
fn reconstruction_options_without_file_only_offer_no_reconstruction() {
    let dir = TempDir::new().expect("tempdir");
    let options = Storage::new(dir.path())
        .load_reconstruction_options()
        .expect("options");
    assert_eq!(options, vec![ReconstructionOption::NoReconstruction]);
}

#[test]
fn file_age_is_none_for_missing_file() {
    let dir = TempDir::new().expect("tempdir");
    let age = file_age(&dir.path().join("absent.json"), Utc::now()).expect("age");
    assert!(age.is_none());
}

#[test]
fn file_age_measures_from_modification_time() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(POINTS_FILE_NAME);
    save_points(&path, &[]).expect("save");

    let later = Utc::now() + chrono::Duration::seconds(40);
    let age = file_age(&path, later).expect("age").expect("exists");
    assert!(age >= Duration::from_secs(39));
    assert!(age <= Duration::from_secs(45));
}

#[test]
fn sequences_default_to_empty() {
    let dir = TempDir::new().expect("tempdir");
    let storage = Storage::new(dir.path());
    assert!(storage.load_sequences().expect("sequences").is_empty());

    fs::write(storage.sequences_path(), r#"{"left": ["s1", "s2"]}"#).expect("write");
    let sequences = storage.load_sequences().expect("sequences");
    assert_eq!(
        sequences["left"],
        vec![ShotId::from("s1"), ShotId::from("s2")]
    );
}
