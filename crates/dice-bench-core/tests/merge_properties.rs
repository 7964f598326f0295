//! Property tests for results-store merging.

use dice_bench_core::{Fragment, MetricKind, Mode, ResultsStore, Sample};
use proptest::prelude::*;

fn pt_config() -> ProptestConfig {
    ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    }
}

fn arb_mode() -> impl Strategy<Value = Mode> {
    proptest::sample::select(Mode::ALL.to_vec())
}

fn arb_metric() -> impl Strategy<Value = MetricKind> {
    proptest::sample::select(MetricKind::ALL.to_vec())
}

fn arb_value() -> impl Strategy<Value = Option<Sample>> {
    prop_oneof![
        Just(None),
        Just(Some(Sample::Failed)),
        (0u64..100_000).prop_map(|n| Some(Sample::Count(n))),
        (0u32..100_000).prop_map(|ms| Some(Sample::Seconds(f64::from(ms) / 1000.0))),
    ]
}

type Triple = (String, MetricKind, Mode, Option<Sample>);

fn arb_triples() -> impl Strategy<Value = Vec<Triple>> {
    proptest::collection::vec(
        (
            proptest::sample::select(vec!["a.dice", "b.dice", "c.dice", "d.dice"])
                .prop_map(String::from),
            arb_metric(),
            arb_mode(),
            arb_value(),
        ),
        0..24,
    )
}

fn fragment_of(triples: &[Triple]) -> Fragment {
    let mut fragment = Fragment::new();
    for (benchmark, metric, mode, value) in triples {
        fragment.record(benchmark, *metric, *mode, *value);
    }
    fragment
}

fn stored(
    store: &ResultsStore,
    benchmark: &str,
    metric: MetricKind,
    mode: Mode,
) -> Option<Option<Sample>> {
    store
        .results
        .get(benchmark)
        .and_then(|m| m.get(&metric))
        .and_then(|m| m.get(&mode))
        .copied()
}

proptest! {
    #![proptest_config(pt_config())]

    /// Triples the fragment does not carry keep their old value.
    #[test]
    fn prop_merge_preserves_untouched(old in arb_triples(), new in arb_triples()) {
        let base = ResultsStore::new().merge(fragment_of(&old));
        let update = fragment_of(&new);
        let merged = base.clone().merge(update.clone());

        for (benchmark, metric, mode, _) in &old {
            if update.get(benchmark, *metric, *mode).is_none() {
                prop_assert_eq!(
                    stored(&merged, benchmark, *metric, *mode),
                    stored(&base, benchmark, *metric, *mode)
                );
            }
        }
    }

    /// Every triple the fragment carries ends up exactly as in the fragment.
    #[test]
    fn prop_merge_fragment_wins(old in arb_triples(), new in arb_triples()) {
        let update = fragment_of(&new);
        let merged = ResultsStore::new().merge(fragment_of(&old)).merge(update.clone());

        for (benchmark, metric, mode, _) in &new {
            prop_assert_eq!(
                stored(&merged, benchmark, *metric, *mode),
                update.get(benchmark, *metric, *mode)
            );
        }
    }

    /// Merging the same fragment twice changes nothing the second time.
    #[test]
    fn prop_merge_idempotent(old in arb_triples(), new in arb_triples()) {
        let update = fragment_of(&new);
        let once = ResultsStore::new().merge(fragment_of(&old)).merge(update.clone());
        let twice = once.clone().merge(update);
        prop_assert_eq!(once, twice);
    }

    /// Persisting and reloading keeps null, sentinel and numbers apart.
    #[test]
    fn prop_save_load_round_trip(
        triples in arb_triples(),
        timeout in proptest::option::of(1u64..3600),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let mut fragment = fragment_of(&triples);
        fragment.timeouts.insert(Mode::Det, timeout);
        let store = ResultsStore::new().merge(fragment);

        store.save(&path).unwrap();
        let loaded = ResultsStore::load(&path).unwrap();
        prop_assert_eq!(loaded, store);
    }
}

#[test]
fn merging_other_modes_keeps_existing_mode() {
    let mut first = Fragment::new();
    first.record("a.dice", MetricKind::Time, Mode::Sbk, Some(Sample::Seconds(9.5)));
    let mut second = Fragment::new();
    second.record("a.dice", MetricKind::Time, Mode::NoOpt, Some(Sample::Seconds(1.0)));
    second.record("a.dice", MetricKind::Time, Mode::Det, None);
    second.record("a.dice", MetricKind::Size, Mode::Sbk, Some(Sample::Count(4)));

    let store = ResultsStore::new().merge(first).merge(second);
    assert_eq!(store.value("a.dice", MetricKind::Time, Mode::Sbk), Some(Sample::Seconds(9.5)));
    assert_eq!(store.value("a.dice", MetricKind::Time, Mode::NoOpt), Some(Sample::Seconds(1.0)));
    assert_eq!(store.value("a.dice", MetricKind::Size, Mode::Sbk), Some(Sample::Count(4)));
}
