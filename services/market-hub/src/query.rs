//! Historical range queries over the record index
//!
//! All queries walk an index newest-first from a `(time, sid)` cursor. The
//! cursor is an exclusive upper bound, so feeding a page's last `(time,
//! sid)` back in yields the contiguous next page with no duplicates and no
//! gaps. A `sid` of zero means "everything at or before `time`".
//!
//! Composite order queries union the create/fill/cancel indexes with a
//! 3-way reverse merge by (time, sid), tagging each record with its kind
//! byte.

use storage::Store;

use crate::keys::{self, RecordTag};

/// One page of index values, newest first.
///
/// `timesid` interleaves the (time, sid) pairs of the returned records;
/// the last pair is the cursor for the next page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryPage {
    pub payloads: Vec<Vec<u8>>,
    pub timesid: Vec<i64>,
}

/// A page from a composite query, with one kind byte per record.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaggedPage {
    pub payloads: Vec<Vec<u8>>,
    pub tags: Vec<u8>,
    pub timesid: Vec<i64>,
}

/// Scan one index backwards from the cursor.
///
/// Malformed cursors (negative time, zero count) yield an empty page
/// rather than an error.
pub fn query_index(
    store: &dyn Store,
    tag: RecordTag,
    scope: &str,
    time: i64,
    sid: i64,
    count: usize,
) -> QueryPage {
    let mut page = QueryPage::default();
    if count == 0 || time < 0 || sid < 0 {
        return page;
    }
    let lower = keys::index_prefix(tag, scope);
    let upper = keys::upper_bound(tag, scope, time, sid);
    for (key, value) in store.scan_rev(&lower, &upper, count) {
        let Some((t, s)) = keys::time_sid_of(&key) else {
            continue;
        };
        page.payloads.push(value);
        page.timesid.push(t);
        page.timesid.push(s);
    }
    page
}

/// Reverse-merge several sub-indexes of one scope by (time, sid).
///
/// `sources` pairs each index tag with the kind byte reported for its
/// records. The merge stops after `count` records.
pub fn query_merged(
    store: &dyn Store,
    sources: &[(RecordTag, u8)],
    scope: &str,
    time: i64,
    sid: i64,
    count: usize,
) -> TaggedPage {
    let mut page = TaggedPage::default();
    if count == 0 || time < 0 || sid < 0 {
        return page;
    }

    // Each source can contribute at most `count` records to the page.
    let mut lanes: Vec<(u8, Vec<(i64, i64, Vec<u8>)>, usize)> = sources
        .iter()
        .map(|&(tag, kind)| {
            let lower = keys::index_prefix(tag, scope);
            let upper = keys::upper_bound(tag, scope, time, sid);
            let records = store
                .scan_rev(&lower, &upper, count)
                .into_iter()
                .filter_map(|(key, value)| {
                    keys::time_sid_of(&key).map(|(t, s)| (t, s, value))
                })
                .collect();
            (kind, records, 0)
        })
        .collect();

    while page.payloads.len() < count {
        let mut best: Option<usize> = None;
        for (i, (_, records, pos)) in lanes.iter().enumerate() {
            let Some(&(t, s, _)) = records.get(*pos) else {
                continue;
            };
            let better = match best {
                None => true,
                Some(j) => {
                    let (_, other_records, other_pos) = &lanes[j];
                    let (ot, os, _) = &other_records[*other_pos];
                    (t, s) > (*ot, *os)
                }
            };
            if better {
                best = Some(i);
            }
        }
        let Some(i) = best else {
            break;
        };
        let (kind, records, pos) = &mut lanes[i];
        let (t, s, value) = records[*pos].clone();
        *pos += 1;
        page.payloads.push(value);
        page.tags.push(*kind);
        page.timesid.push(t);
        page.timesid.push(s);
    }
    page
}
