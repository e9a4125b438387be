use std::collections::BTreeMap;

use foundation::bounds::{GeoBounds, LatLng};
use scene::cluster::{ClusterCell, Granularity};
use scene::point::PointRecord;

use crate::filter::ListingFilter;
use crate::record::{ListingRecord, RegionPath};

/// Label for records whose region path is entirely unknown.
pub const UNASSIGNED_LABEL: &str = "unassigned";

#[derive(Default)]
struct Accumulator {
    count: u64,
    lat_sum: f64,
    lng_sum: f64,
}

/// Groups matching records by their region path cut at `granularity`.
///
/// Ordering contract:
/// - Every matching record lands in exactly one cell, so the counts sum to
///   the number of matches. Empty groups are never emitted.
/// - The centroid is the arithmetic mean of member locations, summed in
///   ascending record-id order, so identical inputs give identical cells.
/// - Cells are ordered by region path.
/// - A cell is labelled with its leaf name, or with its full path joined by
///   `" / "` when another cell in the same answer has the same leaf name.
pub fn aggregate<'a, I>(records: I, filter: &ListingFilter, granularity: Granularity) -> Vec<ClusterCell>
where
    I: IntoIterator<Item = &'a ListingRecord>,
{
    let mut matching: Vec<&ListingRecord> = records
        .into_iter()
        .filter(|r| filter.matches(r))
        .collect();
    matching.sort_by(|a, b| a.id.cmp(&b.id));

    let mut groups: BTreeMap<RegionPath, Accumulator> = BTreeMap::new();
    for record in matching {
        let acc = groups.entry(record.region.truncated(granularity)).or_default();
        acc.count += 1;
        acc.lat_sum += record.location.lat;
        acc.lng_sum += record.location.lng;
    }

    let mut leaf_uses: BTreeMap<&str, usize> = BTreeMap::new();
    for path in groups.keys() {
        *leaf_uses.entry(path.leaf().unwrap_or(UNASSIGNED_LABEL)).or_default() += 1;
    }

    groups
        .iter()
        .filter(|(_, acc)| acc.count > 0)
        .map(|(path, acc)| {
            let n = acc.count as f64;
            ClusterCell::new(
                cell_label(path, &leaf_uses),
                acc.count,
                LatLng::new(acc.lat_sum / n, acc.lng_sum / n),
            )
        })
        .collect()
}

fn cell_label(path: &RegionPath, leaf_uses: &BTreeMap<&str, usize>) -> String {
    let leaf = path.leaf().unwrap_or(UNASSIGNED_LABEL);
    if leaf_uses.get(leaf).copied().unwrap_or(0) > 1 {
        path.names().collect::<Vec<_>>().join(" / ")
    } else {
        leaf.to_string()
    }
}

/// Every matching record located inside `bounds` (edges included), ordered
/// by record id.
pub fn query_points<'a, I>(records: I, filter: &ListingFilter, bounds: &GeoBounds) -> Vec<PointRecord>
where
    I: IntoIterator<Item = &'a ListingRecord>,
{
    let mut points: Vec<PointRecord> = records
        .into_iter()
        .filter(|r| bounds.contains(r.location) && filter.matches(r))
        .map(ListingRecord::to_point)
        .collect();
    points.sort_by(|a, b| a.id.cmp(&b.id));
    points
}
