use starturl_core::{CanonicalStartUrl, CompanyIdentity};
use starturl_storage::{
    load_known_sets, load_record_dir, load_vendors, read_urls, sha256_hex, write_records,
    Datastore, YamlDatastore,
};
use tempfile::tempdir;

#[test]
fn known_sets_are_keyed_by_file_stem() {
    let dir = tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("lever.csv"),
        "Acme\thttps://jobs.lever.co/acme\nGlobex\thttps://jobs.lever.co/globex\n",
    )
    .expect("write lever");
    std::fs::write(
        dir.path().join("greenhouse.csv"),
        "initech\tInitech\thttps://boards.greenhouse.io/initech\n",
    )
    .expect("write greenhouse");
    std::fs::write(dir.path().join("notes.txt"), "ignored\n").expect("write notes");

    let known = load_known_sets(dir.path()).expect("load");
    assert_eq!(known.len(), 3);
    assert_eq!(known.vendor_names().collect::<Vec<_>>(), vec!["greenhouse", "lever"]);
    let greenhouse = known.vendor("greenhouse").expect("greenhouse");
    assert_eq!(greenhouse[0].identity.slug.as_deref(), Some("initech"));
}

#[test]
fn missing_known_folder_is_empty() {
    let dir = tempdir().expect("tempdir");
    let known = load_known_sets(&dir.path().join("absent")).expect("load");
    assert!(known.is_empty());
}

#[test]
fn malformed_lines_do_not_spoil_the_file() {
    let dir = tempdir().expect("tempdir");
    std::fs::write(dir.path().join("lever.csv"), "broken\nAcme\thttps://a.example\n")
        .expect("write");
    let lists = load_record_dir(dir.path()).expect("load");
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].1.len(), 1);
}

#[test]
fn read_urls_takes_last_column() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("urls.txt");
    std::fs::write(&file, "Acme\thttps://a.example\nhttps://b.example\n").expect("write");
    assert_eq!(
        read_urls(&file).expect("read"),
        vec!["https://a.example".to_string(), "https://b.example".to_string()]
    );
}

#[tokio::test]
async fn write_records_is_atomic_and_hashed() {
    let dir = tempdir().expect("tempdir");
    let target = dir.path().join("from_google").join("lever.csv");
    let entries = vec![CanonicalStartUrl::new(
        CompanyIdentity::named("Acme"),
        "https://jobs.lever.co/acme",
    )];

    let written = write_records(&target, &entries).await.expect("write");
    let on_disk = std::fs::read(&target).expect("read back");
    assert_eq!(on_disk, b"Acme\thttps://jobs.lever.co/acme\n");
    assert_eq!(written.sha256, sha256_hex(&on_disk));
    assert_eq!(written.records, 1);

    let leftovers = std::fs::read_dir(target.parent().expect("parent"))
        .expect("list")
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);

    let round_trip = load_known_sets(target.parent().expect("parent")).expect("load");
    assert_eq!(round_trip.vendor("lever").expect("lever"), entries.as_slice());
}

#[tokio::test]
async fn yaml_datastore_serves_vendors_queries_and_companies() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("vendors.yaml");
    std::fs::write(
        &file,
        r#"
vendors:
  - id: 7
    name: lever
    main_domain: lever.co
    start_link_regexp: '^https://jobs\.lever\.co/[^/]+'
    ignored_subdomains: [www, hire]
  - name: icims
    main_domain: icims.com
    google_query: 'careers site:icims.com'
companies:
  - company_name: globex
    company_domain: globex.icims.com
    example_job_posting: https://globex.icims.com/jobs/1/job
  - company_name: acme
    company_domain: acme.icims.com
    example_job_posting: https://acme.icims.com/jobs/2/job
"#,
    )
    .expect("write yaml");

    let store = YamlDatastore::new(&file);
    let vendors = load_vendors(&store).await;
    assert_eq!(vendors.len(), 2);
    assert_eq!(vendors[0].ignored_subdomains, vec!["www", "hire"]);

    let filter = vec!["icims".to_string()];
    let rows = store.query_rows(Some(filter.as_slice())).await.expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 2);
    assert_eq!(rows[0].google_query.as_deref(), Some("careers site:icims.com"));

    let all = store.query_rows(None).await.expect("all rows");
    assert_eq!(all[0].id, 7);

    let companies = store.company_rows().await.expect("companies");
    assert_eq!(companies[0].company_domain, "acme.icims.com");
}

#[tokio::test]
async fn unreadable_vendor_file_yields_empty_registry() {
    let dir = tempdir().expect("tempdir");
    let store = YamlDatastore::new(dir.path().join("missing.yaml"));
    assert!(load_vendors(&store).await.is_empty());
}
