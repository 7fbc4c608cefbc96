//! Property-based tests using proptest
//!
//! These tests verify the selection predicates, id parsing and the admission
//! gate's permit accounting using randomized inputs.

use dsprune::datasource::HealthCheck;
use dsprune::gate::AdmissionGate;
use dsprune::selection::{parse_ids, Country, CountryScope, Criterion, IgnoreList};
use dsprune::Error;
use proptest::prelude::*;

/// Database names as they appear without country prefix
fn arb_db_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,20}"
}

fn arb_country() -> impl Strategy<Value = Country> {
    prop_oneof![Just(Country::Br), Just(Country::Co), Just(Country::Mx)]
}

fn arb_scope() -> impl Strategy<Value = CountryScope> {
    prop_oneof![
        Just(CountryScope::All),
        Just(CountryScope::Exact),
        arb_country().prop_map(CountryScope::Country),
    ]
}

/// Postgres-style password failure with arbitrary spacing and user
fn arb_password_failure() -> impl Strategy<Value = String> {
    (" {1,3}", " {1,2}", "[a-z_]{1,12}").prop_map(|(gap1, gap2, user)| {
        format!(
            "FATAL:{}password authentication failed for{}user \"{}\"",
            gap1, gap2, user
        )
    })
}

proptest! {
    /// Any prefixed database name is selected by the all-countries scope
    #[test]
    fn all_scope_accepts_every_country(name in arb_db_name(), country in arb_country()) {
        let dbname = country.dbname(&name);
        prop_assert!(CountryScope::All.matches(&name, Some(&dbname)));
        prop_assert!(CountryScope::Country(country).matches(&name, Some(&dbname)));
    }

    /// A different name never matches, whatever the scope
    #[test]
    fn different_name_never_matches(
        name in arb_db_name(),
        other in arb_db_name(),
        scope in arb_scope(),
        country in arb_country()
    ) {
        prop_assume!(name != other);
        prop_assert!(!scope.matches(&other, Some(&country.dbname(&name))));
        prop_assert!(!scope.matches(&other, Some(&name)));
    }

    /// `matches` agrees with the list of names the scope accepts
    #[test]
    fn matches_agrees_with_dbnames(
        name in arb_db_name(),
        dbname in "[a-z]{2}-[a-z][a-z0-9_]{0,20}|[a-z][a-z0-9_]{0,20}",
        scope in arb_scope()
    ) {
        let accepted = scope.dbnames(&name).contains(&dbname);
        prop_assert_eq!(scope.matches(&name, Some(&dbname)), accepted);
    }

    /// Password failures are never candidates
    #[test]
    fn password_failures_are_ignored(message in arb_password_failure()) {
        let check = HealthCheck { ok: false, message };
        prop_assert!(!IgnoreList::default().is_candidate(&check));
    }

    /// Any other failure is a candidate; passing checks never are
    #[test]
    fn other_failures_are_candidates(message in "[a-z][a-z ]{0,40}", ok in any::<bool>()) {
        let check = HealthCheck { ok, message };
        prop_assert_eq!(IgnoreList::default().is_candidate(&check), !ok);
    }

    /// Ids survive formatting and parsing, and duplicates collapse
    #[test]
    fn ids_parse_and_dedupe(ids in prop::collection::vec(0u64..10_000, 1..30)) {
        let input = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(" ");
        let parsed = parse_ids(&input).unwrap();
        prop_assert_eq!(&parsed, &ids);

        let Criterion::ByExplicitIds(unique) = Criterion::by_ids(parsed).unwrap() else {
            unreachable!("by_ids always builds ByExplicitIds");
        };
        prop_assert!(unique.len() <= ids.len());
        for id in &ids {
            prop_assert!(unique.contains(id));
        }
    }

    /// Non-numeric tokens are rejected
    #[test]
    fn non_numeric_ids_rejected(token in "[a-z]{1,5}") {
        let input = format!("1 {} 2", token);
        prop_assert!(matches!(parse_ids(&input), Err(Error::Validation(_))));
    }

    /// Every permit comes back, whether the guarded operation succeeds or fails
    #[test]
    fn gate_releases_every_permit(
        capacity in 1usize..8,
        outcomes in prop::collection::vec(any::<bool>(), 0..40)
    ) {
        let gate = AdmissionGate::new(capacity);

        let results = tokio_test::block_on(futures::future::join_all(
            outcomes.iter().map(|&ok| {
                let gate = gate.clone();
                async move {
                    gate.run(async move {
                        tokio::task::yield_now().await;
                        if ok { Ok(()) } else { Err(Error::validation("failed")) }
                    })
                    .await
                }
            }),
        ));

        prop_assert_eq!(results.iter().filter(|r| r.is_ok()).count(), outcomes.iter().filter(|ok| **ok).count());
        prop_assert_eq!(gate.available(), capacity);
    }
}
