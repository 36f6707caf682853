use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use anagrammatic::canonical::fingerprint;
use anagrammatic::{
    CandidateRecord, Cascade, Coordinator, MatchStats, MatcherConfig, SegmentedStore,
};

const PAIRS: [(&str, &str); 5] = [
    ("So bored all the time", "Berit od hates me lol"),
    ("Lord Jesus it's a fart", "It's just sad forreal"),
    ("This flow ain't right", "how is that flirting."),
    ("Moist as heck in here", "He The Reason Im Sick ."),
    ("Freight is so pathetic.", "straight piece of shit"),
];

fn run(order: &[(u64, &str)]) -> BTreeSet<(String, String)> {
    let overflow = Arc::new(SegmentedStore::in_memory(100).unwrap());
    let sink = Arc::new(Mutex::new(BTreeSet::new()));
    let seen = Arc::clone(&sink);
    let mut coordinator =
        Coordinator::open(MatcherConfig::default(), overflow, Arc::new(MatchStats::new()))
            .unwrap()
            .with_hit_handler(move |hit| {
                let [a, b] = hit.texts();
                let (a, b) = if a <= b { (a, b) } else { (b, a) };
                seen.lock().unwrap().insert((a.to_string(), b.to_string()));
            });
    for (id, text) in order {
        coordinator
            .handle_input(CandidateRecord::new(*id, *text))
            .unwrap();
    }
    coordinator.close().unwrap();
    let hits = sink.lock().unwrap().clone();
    hits
}

#[test]
fn fingerprints_ignore_order_case_and_punctuation() {
    for (one, two) in PAIRS {
        assert_eq!(fingerprint(one), fingerprint(two), "{one} / {two}");
        assert_eq!(fingerprint(one), fingerprint(one));
    }
    assert_eq!(fingerprint("Listen!"), fingerprint("s i l e n t"));
    assert_eq!(fingerprint("LISTEN"), fingerprint("enlist 😀 42"));
}

#[test]
fn cascade_verdict_is_symmetric() {
    let cascade = Cascade::default();
    for (one, two) in PAIRS {
        assert_eq!(cascade.verdict(one, two), cascade.verdict(two, one));
        assert!(cascade.is_interesting_anagram(one, two), "{one} / {two}");
    }
    assert_eq!(
        cascade.verdict("tinsel", "listen"),
        cascade.verdict("listen", "tinsel")
    );
}

#[test]
fn arrival_order_does_not_change_the_hits() {
    let forward: Vec<(u64, &str)> = PAIRS
        .iter()
        .flat_map(|(a, b)| [*a, *b])
        .enumerate()
        .map(|(i, t)| (i as u64, t))
        .collect();
    let mut backward = forward.clone();
    backward.reverse();

    let first = run(&forward);
    assert_eq!(first.len(), PAIRS.len());
    assert_eq!(first, run(&backward));
    assert_eq!(first, run(&forward));
}
