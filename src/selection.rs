use std::collections::HashMap;
use std::hash::Hash;

/// Absorbs accumulated rounding when tick length divides a delay exactly.
const TIMER_EPSILON: f32 = 1e-4;

/// Debounce state for one item. Items in the neutral `Unselected` phase carry no entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HysteresisState {
    pub stable: bool,
    pub timer: f32,
    pending: bool,
}

impl HysteresisState {
    fn pending_select() -> Self {
        Self { stable: false, timer: 0.0, pending: true }
    }

    fn selected() -> Self {
        Self { stable: true, timer: 0.0, pending: false }
    }

    pub fn phase(&self) -> SelectionPhase {
        match (self.stable, self.pending) {
            (false, false) => SelectionPhase::Unselected,
            (false, true) => SelectionPhase::PendingSelect(self.timer),
            (true, false) => SelectionPhase::Selected,
            (true, true) => SelectionPhase::PendingDeselect(self.timer),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionPhase {
    Unselected,
    PendingSelect(f32),
    Selected,
    PendingDeselect(f32),
}

/// What the hit test reported this tick, from the point of view of the item filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTarget<K> {
    Candidate(K),
    /// Something that is not an item (a named object) is the nearest hit.
    Elsewhere,
    Nothing,
}

impl<K> From<Option<K>> for RawTarget<K> {
    fn from(value: Option<K>) -> Self {
        match value {
            Some(key) => RawTarget::Candidate(key),
            None => RawTarget::Nothing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionChange<K> {
    pub previous: Option<K>,
    pub current: Option<K>,
}

/// Turns a noisy per-tick raw target into a stable single selection.
///
/// Timers start at zero on the tick that enters a pending phase and grow by `dt` on each
/// later tick while the condition holds; the transition commits once the timer reaches
/// its delay. From a neutral filter the first candidate is selected on the same tick.
/// A raw target that moves to another candidate (or to a non-item) drops the current
/// selection on the same tick, so two items are never selected together.
#[derive(Debug, Clone)]
pub struct SelectionHysteresisFilter<K> {
    select_delay: f32,
    deselect_delay: f32,
    states: HashMap<K, HysteresisState>,
    selected: Option<K>,
}

impl<K: Copy + Eq + Hash> SelectionHysteresisFilter<K> {
    pub fn new(select_delay: f32, deselect_delay: f32) -> Self {
        Self {
            select_delay: select_delay.max(0.0),
            deselect_delay: deselect_delay.max(0.0),
            states: HashMap::new(),
            selected: None,
        }
    }

    pub fn stable(&self) -> Option<K> {
        self.selected
    }

    pub fn is_selected(&self, key: &K) -> bool {
        self.selected.as_ref() == Some(key)
    }

    pub fn phase(&self, key: &K) -> SelectionPhase {
        self.states.get(key).map(HysteresisState::phase).unwrap_or(SelectionPhase::Unselected)
    }

    pub fn is_neutral(&self) -> bool {
        self.states.is_empty()
    }

    pub fn update(&mut self, raw: Option<K>, dt: f32) -> Option<SelectionChange<K>> {
        self.update_raw(RawTarget::from(raw), dt)
    }

    /// Advances every tracked item by one targeting tick. Returns the change to the
    /// stable selection, if any.
    pub fn update_raw(&mut self, raw: RawTarget<K>, dt: f32) -> Option<SelectionChange<K>> {
        let previous = self.selected;
        let was_neutral = self.is_neutral();
        let candidate = match raw {
            RawTarget::Candidate(key) => Some(key),
            RawTarget::Elsewhere | RawTarget::Nothing => None,
        };
        let dt = dt.max(0.0);

        let mut committed = None;
        let mut released = Vec::new();
        for (key, state) in self.states.iter_mut() {
            let targeted = candidate.as_ref() == Some(key);
            if state.stable {
                if targeted {
                    state.pending = false;
                    state.timer = 0.0;
                } else if matches!(raw, RawTarget::Nothing) {
                    if state.pending {
                        state.timer += dt;
                    } else {
                        state.pending = true;
                        state.timer = 0.0;
                    }
                    if state.timer + TIMER_EPSILON >= self.deselect_delay {
                        released.push(*key);
                    }
                } else {
                    released.push(*key);
                }
            } else if targeted {
                state.timer += dt;
                if state.timer + TIMER_EPSILON >= self.select_delay {
                    committed = Some(*key);
                }
            } else {
                released.push(*key);
            }
        }
        for key in released {
            self.states.remove(&key);
            if self.selected == Some(key) {
                self.selected = None;
            }
        }

        if let Some(key) = candidate {
            if !self.states.contains_key(&key) {
                if was_neutral || self.select_delay <= 0.0 {
                    committed = Some(key);
                    self.states.insert(key, HysteresisState::selected());
                } else {
                    self.states.insert(key, HysteresisState::pending_select());
                }
            }
        }
        if let Some(key) = committed {
            self.states.insert(key, HysteresisState::selected());
            self.selected = Some(key);
        }

        (self.selected != previous).then_some(SelectionChange { previous, current: self.selected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: f32 = 0.05;

    #[test]
    fn neutral_filter_selects_immediately() {
        let mut filter = SelectionHysteresisFilter::new(0.05, 0.25);
        let change = filter.update(Some(1u32), TICK);
        assert_eq!(change, Some(SelectionChange { previous: None, current: Some(1) }));
        assert_eq!(filter.phase(&1), SelectionPhase::Selected);
    }

    #[test]
    fn switch_drops_old_selection_same_tick() {
        let mut filter = SelectionHysteresisFilter::new(0.05, 0.25);
        filter.update(Some(1u32), TICK);
        filter.update(Some(2), TICK);
        assert_eq!(filter.stable(), None);
        assert_eq!(filter.phase(&1), SelectionPhase::Unselected);
        assert_eq!(filter.phase(&2), SelectionPhase::PendingSelect(0.0));
        filter.update(Some(2), TICK);
        assert_eq!(filter.stable(), Some(2));
    }

    #[test]
    fn named_object_hit_releases_item() {
        let mut filter = SelectionHysteresisFilter::new(0.05, 0.25);
        filter.update(Some(4u32), TICK);
        let change = filter.update_raw(RawTarget::Elsewhere, TICK);
        assert_eq!(change, Some(SelectionChange { previous: Some(4), current: None }));
    }

    #[test]
    fn pending_select_cancelled_by_nothing() {
        let mut filter = SelectionHysteresisFilter::new(0.05, 0.25);
        filter.update(Some(1u32), TICK);
        filter.update(Some(2), TICK);
        filter.update(None, TICK);
        assert!(filter.is_neutral());
        assert_eq!(filter.stable(), None);
    }

    #[test]
    fn deselect_waits_for_delay() {
        let mut filter = SelectionHysteresisFilter::new(0.05, 0.25);
        filter.update(Some(9u32), TICK);
        for _ in 0..5 {
            assert!(filter.update(None, TICK).is_none());
            assert!(filter.is_selected(&9));
        }
        let change = filter.update(None, TICK);
        assert_eq!(change, Some(SelectionChange { previous: Some(9), current: None }));
    }
}
