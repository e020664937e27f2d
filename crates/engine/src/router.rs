// In crates/engine/src/router.rs

use core_types::Instrument;

/// The two disjoint halves of the universe for one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPartition {
    /// Served by pushed prices.
    pub live: Vec<Instrument>,
    /// Served by the batch poll scheduler.
    pub poll: Vec<Instrument>,
}

/// Splits the universe by input order: the first `live_capacity` instruments go to the
/// live feed, the rest are polled. The split is fixed for the whole session.
pub fn partition(universe: &[Instrument], live_capacity: usize) -> FeedPartition {
    let split = live_capacity.min(universe.len());
    let (live, poll) = universe.split_at(split);
    tracing::info!(
        live = live.len(),
        poll = poll.len(),
        capacity = live_capacity,
        "Partitioned instrument universe."
    );
    FeedPartition {
        live: live.to_vec(),
        poll: poll.to_vec(),
    }
}
