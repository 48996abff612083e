use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shelfwalk::selection::{RawTarget, SelectionChange, SelectionHysteresisFilter, SelectionPhase};

const TICK: f32 = 0.05;
const SELECT_DELAY: f32 = 0.05;
const DESELECT_DELAY: f32 = 0.25;

#[test]
fn brief_gap_keeps_selection() {
    const A: u32 = 1;
    let sequence = [Some(A), Some(A), Some(A), None, None, Some(A), Some(A), Some(A), Some(A), Some(A)];
    let mut filter = SelectionHysteresisFilter::new(SELECT_DELAY, DESELECT_DELAY);
    for (tick, raw) in sequence.into_iter().enumerate() {
        let change = filter.update(raw, TICK);
        if tick == 0 {
            assert_eq!(change, Some(SelectionChange { previous: None, current: Some(A) }), "first target is immediate");
        } else {
            assert!(change.is_none(), "tick {tick} changed selection: {change:?}");
        }
        assert_eq!(filter.stable(), Some(A), "tick {tick}");
    }
}

#[test]
fn short_runs_never_select_after_leaving_neutral() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let dt = 0.02;
    for _ in 0..200 {
        let mut filter = SelectionHysteresisFilter::new(SELECT_DELAY, DESELECT_DELAY);
        let mut last: Option<u32> = None;
        let mut run = 0;
        let mut first_run_over = false;
        for _ in 0..60 {
            // Runs of at most two ticks accumulate 0.02s, below the select delay.
            let mut next = rng.gen_range(0..4u32);
            if Some(next) == last && run >= 2 {
                next = (next + 1) % 4;
            }
            if Some(next) == last {
                run += 1;
            } else {
                if last.is_some() {
                    first_run_over = true;
                }
                run = 1;
            }
            last = Some(next);
            filter.update(Some(next), dt);
            if first_run_over {
                assert_eq!(filter.stable(), None, "a short run was committed");
            }
        }
    }
}

#[test]
fn direct_switch_never_overlaps() {
    let mut filter = SelectionHysteresisFilter::new(SELECT_DELAY, DESELECT_DELAY);
    filter.update(Some(1u32), TICK);
    assert!(filter.is_selected(&1));

    let change = filter.update(Some(2), TICK);
    assert_eq!(change, Some(SelectionChange { previous: Some(1), current: None }));
    assert_eq!(filter.phase(&1), SelectionPhase::Unselected);
    assert!(matches!(filter.phase(&2), SelectionPhase::PendingSelect(_)));
    assert!(!filter.is_selected(&1) || !filter.is_selected(&2));

    let change = filter.update(Some(2), TICK);
    assert_eq!(change, Some(SelectionChange { previous: None, current: Some(2) }));
    assert_eq!(filter.phase(&2), SelectionPhase::Selected);
}

#[test]
fn deselect_to_nothing_waits_full_delay() {
    let mut filter = SelectionHysteresisFilter::new(SELECT_DELAY, DESELECT_DELAY);
    filter.update(Some(7u32), TICK);
    let mut none_ticks = 0;
    let mut released_at = None;
    for tick in 0..20 {
        none_ticks += 1;
        if filter.update(None, TICK).is_some() {
            released_at = Some(tick);
            break;
        }
        assert!(filter.is_selected(&7));
    }
    let released_at = released_at.expect("selection eventually clears");
    let elapsed_since_first_none = released_at as f32 * TICK;
    assert!(elapsed_since_first_none + 1e-4 >= DESELECT_DELAY, "cleared after {elapsed_since_first_none}s");
    assert_eq!(none_ticks, 6);
    assert!(filter.is_neutral());
}

#[test]
fn named_object_hit_is_not_a_gap() {
    let mut filter = SelectionHysteresisFilter::new(SELECT_DELAY, DESELECT_DELAY);
    filter.update(Some(3u32), TICK);
    assert!(filter.update_raw(RawTarget::Elsewhere, TICK).is_some());
    assert_eq!(filter.stable(), None);
}
