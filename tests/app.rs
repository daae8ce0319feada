use std::fs;
use std::io::Write;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use kira_expression_atlas::app::App;
use kira_expression_atlas::config::{Config, ConfigLoader, SampleEntry};
use kira_expression_atlas::domain::SampleName;
use kira_expression_atlas::error::KiraError;
use kira_expression_atlas::output::JsonOutput;

fn setup() -> (tempfile::TempDir, App) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let data = root.join("data");
    fs::create_dir_all(data.as_std_path()).unwrap();

    fs::write(
        data.join("gene_annotation.csv").as_std_path(),
        "gene_id,gene_name\ngeneA,Alpha\ngeneB,Beta\n",
    )
    .unwrap();
    fs::write(
        data.join("T25LD.d4d5.fpkm.csv").as_std_path(),
        "gene_id\t10.r1\t10.r2\t20.r1\t20.r2\ngeneA\t2.0\t4.0\tNaN\t6.0\n",
    )
    .unwrap();

    // second sample ships gzipped
    let gz = fs::File::create(data.join("T18DD.tsv.gz").as_std_path()).unwrap();
    let mut encoder = GzEncoder::new(gz, Compression::default());
    encoder
        .write_all(b"gene_id\t0.r1\t0.r2\ngeneA\t1\t3\ngeneB\t2\t2\n")
        .unwrap();
    encoder.finish().unwrap();

    let config = Config {
        annotation: Some(data.join("gene_annotation.csv").to_string()),
        store_dir: Some(root.join("stores").to_string()),
        source_dir: Some(data.to_string()),
        samples: vec![
            SampleEntry::Shorthand("T25LD".to_string()),
            SampleEntry::Detailed(kira_expression_atlas::config::SampleEntryObject {
                name: "T18DD".to_string(),
                source: Some(data.join("T18DD.tsv.gz").to_string()),
            }),
        ],
        ..Config::default()
    };
    let app = App::new(ConfigLoader::resolve_config(config).unwrap());
    (temp, app)
}

#[test]
fn ingest_all_then_query() {
    let (_temp, app) = setup();

    let ingested = app.ingest(&[], &JsonOutput).unwrap();
    assert_eq!(ingested.items.len(), 2);
    assert_eq!(ingested.items[1].gene_count, 2);

    let atlas = app.open_atlas().unwrap();
    let result = atlas.query_list(" geneA , geneB,unknown ").unwrap();
    assert_eq!(result.results.len(), 2);

    let gene_a = &result.results[0];
    assert_eq!(gene_a.expression.len(), 2);
    assert_eq!(gene_a.expression["T25LD"].mean, vec![Some(3.0), None]);
    assert_eq!(gene_a.expression["T18DD"].mean, vec![Some(2.0)]);

    let gene_b = &result.results[1];
    assert_eq!(gene_b.gene_name, "Beta");
    assert!(!gene_b.expression.contains_key("T25LD"));

    let json = serde_json::to_value(&result.results).unwrap();
    assert_eq!(json[0]["expression"]["T25LD"]["mean"][1], serde_json::Value::Null);
    assert_eq!(json[0]["expression"]["T25LD"]["time_points"][0], 10);
}

#[test]
fn query_list_rejects_empty_input() {
    let (_temp, app) = setup();
    app.ingest(&[], &JsonOutput).unwrap();
    let atlas = app.open_atlas().unwrap();

    let err = atlas.query_list(" , ,").unwrap_err();
    assert_matches!(err, KiraError::EmptyGeneList);
}

#[test]
fn serving_requires_built_stores() {
    let (_temp, app) = setup();
    let err = app.open_atlas().err().unwrap();
    assert_matches!(err, KiraError::StoreNotFound(_));
}

#[test]
fn ingest_unknown_sample_is_rejected() {
    let (_temp, app) = setup();
    let sample: SampleName = "T99XX".parse().unwrap();
    let err = app.ingest(&[sample], &JsonOutput).unwrap_err();
    assert_matches!(err, KiraError::UnknownSample(_));
}

#[test]
fn list_and_info_report_manifests() {
    let (_temp, app) = setup();
    let t25ld: SampleName = "T25LD".parse().unwrap();
    app.ingest(std::slice::from_ref(&t25ld), &JsonOutput).unwrap();

    let listed = app.list(&JsonOutput).unwrap();
    assert_eq!(listed.stores.len(), 2);
    assert!(listed.stores[0].built);
    assert_eq!(listed.stores[0].time_points, Some(vec![10, 20]));
    assert!(!listed.stores[1].built);

    let info = app.info(&t25ld, &JsonOutput).unwrap();
    assert_eq!(info.gene_count, 1);
    assert!(info.tool.starts_with("kira-ea/"));

    let t18dd: SampleName = "T18DD".parse().unwrap();
    let err = app.info(&t18dd, &JsonOutput).unwrap_err();
    assert_matches!(err, KiraError::StoreNotFound(_));
}
