// tests/timeline_props.rs
//
// Randomized merge sequences: whatever arrives, a timeline stays sorted,
// duplicate-free and capped, and `added` only ever holds unseen ids.

use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use rand::Rng;

use subject_news_tracker::timeline::{Timeline, MAX_TIMELINE_LEN};
use subject_news_tracker::{Article, SubjectKey};

fn article(n: u32, minute: i64, subject: &SubjectKey) -> Article {
    let url = format!("https://rand.test/{n}");
    Article {
        id: url.clone(),
        title: format!("Story {n}"),
        description: None,
        url,
        url_to_image: None,
        published_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(minute),
        source: "Rand".into(),
        subject: subject.clone(),
    }
}

fn assert_invariants(tl: &Timeline) {
    let items = tl.articles();
    assert!(items.len() <= MAX_TIMELINE_LEN);
    assert!(items
        .windows(2)
        .all(|w| w[0].published_at >= w[1].published_at));
    let ids: HashSet<&str> = items.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids.len(), items.len(), "duplicate id in timeline");
}

#[test]
fn random_merges_keep_invariants() {
    let subject = SubjectKey::parse("random").unwrap();
    let mut rng = rand::rng();

    for _round in 0..20 {
        let mut tl = Timeline::default();
        for _batch in 0..30 {
            let size = rng.random_range(0..40);
            let batch: Vec<Article> = (0..size)
                .map(|_| {
                    let n = rng.random_range(0..300u32);
                    // same id always carries the same timestamp
                    article(n, i64::from(n) * 7 % 1_000, &subject)
                })
                .collect();

            let before: HashSet<String> = tl.articles().iter().map(|a| a.id.clone()).collect();
            let outcome = tl.merge(batch.clone());

            assert_invariants(&tl);
            assert_eq!(outcome.len, tl.len());
            let added: HashSet<&str> = outcome.added.iter().map(|a| a.id.as_str()).collect();
            assert_eq!(added.len(), outcome.added.len(), "added holds duplicates");
            assert!(added.iter().all(|id| !before.contains(*id)));
            // everything new in the batch is reported
            let expected: HashSet<&str> = batch
                .iter()
                .map(|a| a.id.as_str())
                .filter(|id| !before.contains(*id))
                .collect();
            assert_eq!(added, expected);
            assert!(outcome
                .added
                .windows(2)
                .all(|w| w[0].published_at >= w[1].published_at));
        }
    }
}

#[test]
fn replace_with_random_batch_keeps_invariants() {
    let subject = SubjectKey::parse("random").unwrap();
    let mut rng = rand::rng();
    let mut tl = Timeline::default();
    for _ in 0..50 {
        let batch: Vec<Article> = (0..rng.random_range(0..250))
            .map(|_| {
                let n = rng.random_range(0..500u32);
                article(n, i64::from(n), &subject)
            })
            .collect();
        tl.replace(batch);
        assert_invariants(&tl);
    }
}
