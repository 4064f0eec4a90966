//! Property-based tests using proptest

use chrono::{DateTime, Datelike, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

use auditory::audit::Redactor;
use auditory::common::types::{collect_headers, AuditMetadata, AuditRecord};
use auditory::store::file::{decode_key, encode_key};
use auditory::store::{sort_partition, DayPartition};

fn record(seq: usize, event_at: DateTime<Utc>) -> AuditRecord {
    AuditRecord {
        metadata: AuditMetadata {
            key: "k".to_string(),
            event_name: "e".to_string(),
            request_id: seq.to_string(),
            correlation_id: "c".to_string(),
            event_at,
        },
        data: json!(seq),
    }
}

// ---------------------------------------------------------------------------
// sort_partition
// ---------------------------------------------------------------------------

proptest! {
    /// 並べ替え後はevent_at降順
    #[test]
    fn partition_is_sorted_descending(offsets in prop::collection::vec(0i64..1_000, 0..50)) {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut records: Vec<_> = offsets
            .iter()
            .enumerate()
            .map(|(i, s)| record(i, base + chrono::Duration::seconds(*s)))
            .collect();
        sort_partition(&mut records);
        for pair in records.windows(2) {
            prop_assert!(pair[0].metadata.event_at >= pair[1].metadata.event_at);
        }
        prop_assert_eq!(records.len(), offsets.len());
    }

    /// 同時刻のレコードは挿入順を保つ
    #[test]
    fn equal_timestamps_keep_insertion_order(offsets in prop::collection::vec(0i64..3, 0..40)) {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut records: Vec<_> = offsets
            .iter()
            .enumerate()
            .map(|(i, s)| record(i, base + chrono::Duration::seconds(*s)))
            .collect();
        sort_partition(&mut records);
        for pair in records.windows(2) {
            if pair[0].metadata.event_at == pair[1].metadata.event_at {
                let a: usize = pair[0].metadata.request_id.parse().unwrap();
                let b: usize = pair[1].metadata.request_id.parse().unwrap();
                prop_assert!(a < b, "tie order changed: {} before {}", a, b);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DayPartition
// ---------------------------------------------------------------------------

proptest! {
    /// パーティション名はゼロ埋めなしのUTC日付
    #[test]
    fn partition_name_is_unpadded_utc_date(secs in 0i64..4_102_444_800) {
        let at = Utc.timestamp_opt(secs, 0).unwrap();
        let expected = format!("{}-{}-{}", at.year(), at.month(), at.day());
        let partition = DayPartition::of(at);
        prop_assert_eq!(partition.as_str(), expected.as_str());
    }
}

// ---------------------------------------------------------------------------
// ファイル名エンコード
// ---------------------------------------------------------------------------

proptest! {
    /// エンコード結果はパス区切りを含まず、隠しファイルにならない
    #[test]
    fn encoded_key_is_a_single_safe_file_name(key in "\\PC{1,40}") {
        let encoded = encode_key(&key);
        prop_assert!(!encoded.contains('/'));
        prop_assert!(!encoded.contains('\\'));
        prop_assert!(!encoded.starts_with('.'));
        prop_assert_eq!(decode_key(&encoded), Some(key));
    }
}

// ---------------------------------------------------------------------------
// Redactor
// ---------------------------------------------------------------------------

proptest! {
    /// マスク後の値は元の文字数と同じ長さの `*`
    #[test]
    fn masked_header_keeps_length(value in "[ -~]{0,64}") {
        let redactor = Redactor::from_csv("authorization");
        let mut headers = collect_headers([("authorization", value.as_bytes())]);
        redactor.redact_headers(&mut headers);
        let masked = &headers["authorization"][0];
        prop_assert_eq!(masked.chars().count(), value.chars().count());
        prop_assert!(masked.chars().all(|c| c == '*'));
    }
}
