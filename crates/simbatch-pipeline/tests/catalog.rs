use chrono::Utc;
use simbatch_pipeline::{
    CatalogFormat, Factor, PipelineError, ResultCatalog, SimulationIndex, SimulationManifest,
};
use std::path::PathBuf;

fn manifest(path: PathBuf) -> SimulationManifest {
    SimulationManifest {
        key: "sla_10".to_string(),
        naming: "manual".to_string(),
        name: "sla_10".to_string(),
        path: path.clone(),
        base_ins: PathBuf::from("/templates/global.ins"),
        ins_file: path.join("sla_10.ins"),
        pfts: vec!["TeBE".to_string(), "C3G".to_string()],
        generated_at: Utc::now(),
        factors: vec![
            Factor::parse("TeBE.sla", "10").expect("factor"),
            Factor::Composite {
                factors: vec![
                    Factor::block("group", "C3G", "g0", "0.2"),
                    Factor::parse("nyear", "100").expect("factor"),
                ],
            },
        ],
    }
}

#[test]
fn manifests_round_trip_in_both_formats() {
    for format in [CatalogFormat::Toml, CatalogFormat::Json] {
        let temp = tempfile::tempdir().expect("tempdir");
        let catalog = ResultCatalog::new(format);
        let written = manifest(temp.path().to_path_buf());
        let path = catalog.write_manifest(&written).expect("write manifest");
        assert_eq!(
            path,
            temp.path().join(format!("manifest.{}", format.extension()))
        );
        let read = catalog.read_manifest(temp.path()).expect("read manifest");
        assert_eq!(read, written);
    }
}

#[test]
fn index_round_trips() {
    let temp = tempfile::tempdir().expect("tempdir");
    let catalog = ResultCatalog::default();
    let index = SimulationIndex {
        simulations: vec![PathBuf::from("global/sla_10"), PathBuf::from("global/sla_20")],
    };
    let path = catalog.write_index(temp.path(), &index).expect("write index");
    assert_eq!(path, temp.path().join("index.toml"));
    assert_eq!(catalog.read_index(temp.path()).expect("read index"), index);
}

#[test]
fn missing_files_are_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let catalog = ResultCatalog::new(CatalogFormat::Json);
    assert!(matches!(
        catalog.read_index(temp.path()),
        Err(PipelineError::NotFound(path)) if path == temp.path().join("index.json")
    ));
    assert!(matches!(
        catalog.read_manifest(temp.path()),
        Err(PipelineError::NotFound(_))
    ));
    let missing_dir = manifest(temp.path().join("nope"));
    assert!(matches!(
        catalog.write_manifest(&missing_dir),
        Err(PipelineError::NotFound(_))
    ));
}
