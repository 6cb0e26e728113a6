use super::*;
use crate::{derive, derive_all, load_counterparts, load_endpoints};
use policy_broker_core::PolicyTriple;

#[tokio::test]
async fn loads_labelled_endpoints_only() {
    let _tracing = init_tracing();

    let catalog = FakeCatalog::default();
    catalog.add_source("si-src", "s1", "web", None);
    catalog.add_destination("si-dst", "s1", "web");
    catalog.add_instance("si-plain", "s1", Labels::new());
    catalog.add_source("si-bad", "s1", "not a name", Some("local"));
    catalog.bind("si-src", "A1", None);
    catalog.bind("si-dst", "A2", Some(9090));
    catalog.bind("si-plain", "A3", None);

    let endpoints = load_endpoints(&catalog).await.expect("catalog must load");
    assert_eq!(
        endpoints,
        vec![
            mk_source("si-src", "s1", "web", Scope::Local, &["A1"]),
            mk_destination("si-dst", "s1", "web", &[("A2", 9090, Protocol::Tcp)]),
        ]
    );
}

#[tokio::test]
async fn destination_counterparts_span_spaces() {
    let catalog = FakeCatalog::default();
    catalog.add_source("si-local", "s2", "web", Some("local"));
    catalog.add_source("si-global", "s3", "web", Some("global"));
    catalog.add_source("si-other", "s1", "api", None);
    catalog.add_destination("si-dst", "s1", "web");
    catalog.bind("si-local", "A1", None);
    catalog.bind("si-global", "A3", None);
    catalog.bind("si-dst", "A2", None);

    let dst = mk_destination("si-dst", "s1", "web", &[("A2", 8080, Protocol::Tcp)]);
    let counterparts = load_counterparts(&catalog, &dst).await.unwrap();
    let ids = counterparts
        .iter()
        .map(|e| e.instance_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["si-local", "si-global"]);

    // Only the global source is visible from s1.
    assert_eq!(
        derive(&dst, &counterparts),
        vec![PolicyTriple::new("A3", "A2", Protocol::Tcp, 8080)]
    );
}

#[tokio::test]
async fn local_source_counterparts_stay_in_space() {
    let catalog = FakeCatalog::default();
    catalog.add_destination("si-d1", "s1", "web");
    catalog.add_destination("si-d2", "s2", "web");
    catalog.add_destination("si-d3", "s1", "api");

    let src = mk_source("si-src", "s1", "web", Scope::Local, &["A1"]);
    let counterparts = load_counterparts(&catalog, &src).await.unwrap();
    let ids = counterparts
        .iter()
        .map(|e| e.instance_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["si-d1"]);

    let src = mk_source("si-src", "s1", "web", Scope::Global, &["A1"]);
    let counterparts = load_counterparts(&catalog, &src).await.unwrap();
    assert_eq!(counterparts.len(), 2);
}

#[tokio::test]
async fn single_endpoint_matches_full_catalog() {
    let catalog = FakeCatalog::default();
    catalog.add_source("si-src", "s1", "web", None);
    catalog.add_destination("si-d1", "s1", "web");
    catalog.add_destination("si-d2", "s2", "web");
    catalog.bind("si-src", "A1", None);
    catalog.bind("si-d1", "A2", Some(9090));
    catalog.bind("si-d1", "A3", None);
    catalog.bind("si-d2", "A4", None);

    let endpoints = load_endpoints(&catalog).await.unwrap();
    let mut union = Vec::new();
    for endpoint in &endpoints {
        let counterparts = load_counterparts(&catalog, endpoint).await.unwrap();
        union.extend(derive(endpoint, &counterparts));
    }
    union.sort();
    union.dedup();

    assert_eq!(union, derive_all(&endpoints));
    assert_eq!(
        union,
        vec![
            PolicyTriple::new("A1", "A2", Protocol::Tcp, 9090),
            PolicyTriple::new("A1", "A3", Protocol::Tcp, 8080),
        ]
    );
}
