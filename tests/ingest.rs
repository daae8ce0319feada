use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use kira_expression_atlas::domain::SampleName;
use kira_expression_atlas::error::KiraError;
use kira_expression_atlas::ingest::{ingest_sample, read_expression_table};
use kira_expression_atlas::output::JsonOutput;
use kira_expression_atlas::store::{SampleStore, SeriesStore, Store};

const TABLE: &str = "\
gene_id\t10.r1\t10.r2\t20.r1\t20.r2
geneA\t2.0\t4.0\tNaN\t6.0
geneB\t0\t0\t0\t0
geneC\t1.5\t\t3.0\t5.0
";

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

fn write_table(dir: &Utf8Path, name: &str, content: &str) -> Utf8PathBuf {
    let path = dir.join(name);
    fs::write(path.as_std_path(), content).unwrap();
    path
}

#[test]
fn ingest_then_read_back() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let source = write_table(&root, "T25LD.tsv", TABLE);
    let store = Store::new(root.join("stores"));
    let sample: SampleName = "T25LD".parse().unwrap();

    let report = ingest_sample(&store, &sample, &source, b'\t', &JsonOutput).unwrap();
    assert_eq!(report.gene_count, 3);
    assert_eq!(report.time_points, vec![10, 20]);

    let reader = SampleStore::open(&store, &sample).unwrap();
    let gene_a = reader.get("geneA").unwrap().unwrap();
    let at_10 = gene_a.points[&10];
    assert_eq!((at_10.r1, at_10.r2, at_10.mean), (2.0, 4.0, Some(3.0)));
    let at_20 = gene_a.points[&20];
    assert_eq!((at_20.r1, at_20.r2, at_20.mean), (0.0, 6.0, None));

    // all-zero genes are kept
    let gene_b = reader.get("geneB").unwrap().unwrap();
    assert_eq!(gene_b.points[&20].mean, Some(0.0));

    let gene_c = reader.get("geneC").unwrap().unwrap();
    assert_eq!(gene_c.points[&10].r2, 0.0);
    assert_eq!(gene_c.points[&10].mean, None);
    assert_eq!(gene_c.points[&20].mean, Some(4.0));

    assert!(reader.get("geneZ").unwrap().is_none());
}

#[test]
fn reingest_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let source = write_table(&root, "T18DD.tsv", TABLE);
    let store = Store::new(root.join("stores"));
    let sample: SampleName = "T18DD".parse().unwrap();

    ingest_sample(&store, &sample, &source, b'\t', &JsonOutput).unwrap();
    let first = {
        let reader = SampleStore::open(&store, &sample).unwrap();
        ["geneA", "geneB", "geneC"].map(|id| reader.get(id).unwrap())
    };

    ingest_sample(&store, &sample, &source, b'\t', &JsonOutput).unwrap();
    let reader = SampleStore::open(&store, &sample).unwrap();
    let second = ["geneA", "geneB", "geneC"].map(|id| reader.get(id).unwrap());

    assert_eq!(first, second);
}

#[test]
fn reingest_drops_genes_removed_from_source() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let store = Store::new(root.join("stores"));
    let sample: SampleName = "T25DD".parse().unwrap();

    let source = write_table(&root, "T25DD.tsv", TABLE);
    ingest_sample(&store, &sample, &source, b'\t', &JsonOutput).unwrap();

    let smaller = write_table(&root, "T25DD.v2.tsv", "gene_id\t10.r1\t10.r2\ngeneA\t1\t1\n");
    ingest_sample(&store, &sample, &smaller, b'\t', &JsonOutput).unwrap();

    let reader = SampleStore::open(&store, &sample).unwrap();
    assert!(reader.get("geneB").unwrap().is_none());
    assert_eq!(reader.get("geneA").unwrap().unwrap().time_points(), vec![10]);
}

#[test]
fn malformed_table_keeps_previous_store() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let store = Store::new(root.join("stores"));
    let sample: SampleName = "T29DD".parse().unwrap();

    let good = write_table(&root, "good.tsv", TABLE);
    ingest_sample(&store, &sample, &good, b'\t', &JsonOutput).unwrap();

    let bad = write_table(&root, "bad.tsv", "gene_id\t10.r1\tten.r2\ngeneX\t1\t2\n");
    let err = ingest_sample(&store, &sample, &bad, b'\t', &JsonOutput).unwrap_err();
    assert_matches!(err, KiraError::InvalidTimePointColumn { .. });

    let reader = SampleStore::open(&store, &sample).unwrap();
    assert!(reader.get("geneA").unwrap().is_some());
    assert!(reader.get("geneX").unwrap().is_none());
}

#[test]
fn malformed_table_creates_no_store() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let store = Store::new(root.join("stores"));
    let sample: SampleName = "T25LD".parse().unwrap();

    let bad = write_table(&root, "bad.tsv", "gene_id\t10.r1\t10.r2\n\t1\t2\n");
    let err = ingest_sample(&store, &sample, &bad, b'\t', &JsonOutput).unwrap_err();
    assert_matches!(err, KiraError::MalformedTable { .. });
    assert!(!store.store_exists(&sample));
    assert_matches!(
        SampleStore::open(&store, &sample),
        Err(KiraError::StoreNotFound(_))
    );
}

#[test]
fn duplicate_rows_keep_the_last() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let source = write_table(
        &root,
        "dup.tsv",
        "gene_id\t0.r1\t0.r2\ng1\t1\t1\ng1\t5\t7\n",
    );

    let (_, genes) = read_expression_table(&source, b'\t').unwrap();
    assert_eq!(genes.len(), 1);
    assert_eq!(genes[0].points[&0].mean, Some(6.0));
}

#[test]
fn comma_delimited_tables() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let source = write_table(&root, "t.csv", "id,0.r1,0.r2,4.r1\ng1,1,3,2\n");

    let (columns, genes) = read_expression_table(&source, b',').unwrap();
    assert_eq!(columns.time_points(), vec![0, 4]);
    let at_4 = genes[0].points[&4];
    assert_eq!((at_4.r1, at_4.r2, at_4.mean), (2.0, 0.0, None));
}

#[test]
fn repeated_time_point_column_fails_the_sample() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let store = Store::new(root.join("stores"));
    let sample: SampleName = "T25LD".parse().unwrap();

    let bad = write_table(&root, "dup.tsv", "gene\t10.r1\t10.r2\t10.r1\ng1\t1\t3\t99\n");
    let err = ingest_sample(&store, &sample, &bad, b'\t', &JsonOutput).unwrap_err();
    assert_matches!(err, KiraError::InvalidTimePointColumn { column, .. } if column == "10.r1");
    assert!(!store.store_exists(&sample));
}

#[test]
fn failed_manifest_write_drops_stale_manifest() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let store = Store::new(root.join("stores"));
    let sample: SampleName = "T18DD".parse().unwrap();

    let first = write_table(&root, "first.tsv", TABLE);
    ingest_sample(&store, &sample, &first, b'\t', &JsonOutput).unwrap();
    assert_eq!(store.read_manifest(&sample).unwrap().gene_count, 3);

    // a directory in the way of the temp file makes the manifest write fail
    let blocker = store.manifest_path(&sample).with_extension("json.tmp");
    fs::create_dir_all(blocker.as_std_path()).unwrap();

    let second = write_table(&root, "second.tsv", "gene_id\t0.r1\t0.r2\ngeneQ\t1\t1\n");
    let err = ingest_sample(&store, &sample, &second, b'\t', &JsonOutput).unwrap_err();
    assert_matches!(err, KiraError::Filesystem(_));

    assert_matches!(store.read_manifest(&sample), Err(KiraError::StoreNotFound(_)));
    let reader = SampleStore::open(&store, &sample).unwrap();
    assert!(reader.get("geneQ").unwrap().is_some());
}
