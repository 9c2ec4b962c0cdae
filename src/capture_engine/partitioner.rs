//! Static split of a work batch across lanes.
//!
//! Each lane gets one contiguous slice; there is no rebalancing after the
//! split, so a slow lane finishes last while the others sit idle.

/// Split `items` into at most `lanes` contiguous sub-lists whose sizes differ
/// by at most one. Order is preserved both across and within sub-lists.
///
/// Never returns an empty sub-list: with fewer items than lanes, the number of
/// sub-lists equals the number of items.
#[must_use]
pub fn partition<T>(items: Vec<T>, lanes: usize) -> Vec<Vec<T>> {
    let total = items.len();
    let lanes = lanes.max(1).min(total);
    if lanes == 0 {
        return Vec::new();
    }

    let base = total / lanes;
    let extra = total % lanes;

    let mut remaining = items.into_iter();
    (0..lanes)
        .map(|lane| {
            let size = base + usize::from(lane < extra);
            remaining.by_ref().take(size).collect()
        })
        .collect()
}
