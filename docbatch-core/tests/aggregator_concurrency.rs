use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use proptest::prelude::*;
use tempfile::tempdir;

use docbatch_core::aggregate::OutcomeAggregator;
use docbatch_core::contract::{OutcomeStatus, UploadOutcome};
use docbatch_core::metadata::MetadataRecord;

fn outcome(document: PathBuf, succeeded: bool) -> UploadOutcome {
    UploadOutcome {
        status: if succeeded {
            OutcomeStatus::Succeeded
        } else {
            OutcomeStatus::FailedAfterRetries
        },
        record: MetadataRecord {
            document_id: document
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..Default::default()
        },
        batch_folder: document.parent().map(|p| p.to_path_buf()).unwrap_or_default(),
        document,
        attempts: if succeeded { 1 } else { 4 },
        last_failure: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn counters_match_ledgers_under_concurrent_records(
        mix in proptest::collection::vec(any::<bool>(), 1..48),
        threads in 2usize..8,
    ) {
        let dir = tempdir().unwrap();
        let docs = dir.path().join("Documents");
        fs::create_dir_all(&docs).unwrap();
        let aggregator = OutcomeAggregator::new(dir.path().join("failed/Documents"));

        let outcomes: Vec<UploadOutcome> = mix
            .iter()
            .enumerate()
            .map(|(i, &ok)| {
                let path = docs.join(format!("doc-{i}.pdf"));
                fs::write(&path, b"x").unwrap();
                outcome(path, ok)
            })
            .collect();

        std::thread::scope(|scope| {
            for chunk in outcomes.chunks(outcomes.len().div_ceil(threads)) {
                let aggregator = &aggregator;
                scope.spawn(move || {
                    for o in chunk {
                        aggregator.record(o.clone());
                    }
                });
            }
        });

        let expected_ok = mix.iter().filter(|&&ok| ok).count();
        let ledger = aggregator.snapshot();
        prop_assert_eq!(aggregator.counters().succeeded(), expected_ok);
        prop_assert_eq!(aggregator.counters().failed(), mix.len() - expected_ok);
        prop_assert_eq!(ledger.succeeded.len(), aggregator.counters().succeeded());
        prop_assert_eq!(ledger.failed.len(), aggregator.counters().failed());
        prop_assert_eq!(aggregator.recorded_documents().len(), mix.len());
        prop_assert_eq!(fs::read_dir(&docs).unwrap().count(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_never_double_count() {
    let dir = tempdir().unwrap();
    let aggregator = Arc::new(OutcomeAggregator::new(dir.path().join("failed")));

    let handles = (0..200).map(|i| {
        let aggregator = Arc::clone(&aggregator);
        let document = dir.path().join(format!("missing-{i}.pdf"));
        tokio::spawn(async move { aggregator.record(outcome(document, i % 3 != 0)) })
    });
    for joined in futures::future::join_all(handles).await {
        joined.unwrap();
    }

    let summary = aggregator.summary("01-01-2024");
    assert_eq!(summary.uploaded + summary.failed, 200);
    assert_eq!(summary.failed, 67);
    let ledger = aggregator.snapshot();
    assert_eq!(ledger.succeeded.len(), summary.uploaded);
    assert_eq!(ledger.failed.len(), summary.failed);
}
