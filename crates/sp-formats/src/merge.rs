//! Track merging.

use sp_ir::Event;

/// Merge per-track event lists into one timeline.
///
/// Events are ordered by tick. Ties keep track order first, then the
/// order within the track; the sort is stable so appending tracks in
/// file order is enough.
pub fn merge_tracks<I>(tracks: I) -> Vec<Event>
where
    I: IntoIterator<Item = Vec<Event>>,
{
    let mut events: Vec<Event> = tracks.into_iter().flatten().collect();
    events.sort_by_key(|e| e.tick);
    events
}
