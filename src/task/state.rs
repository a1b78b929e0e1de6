use super::types::State;

/// Whether a task may move from `src` to `dst`.
///
/// Scheduled and Running permit self-transitions so that an idempotent
/// re-send of the same intent is not an error. Completed and Failed are
/// terminal.
pub fn valid_state_transition(src: &State, dst: &State) -> bool {
    match src {
        State::Pending => matches!(dst, State::Scheduled),
        State::Scheduled => matches!(dst, State::Scheduled | State::Running | State::Failed),
        State::Running => matches!(dst, State::Running | State::Completed | State::Failed),
        State::Completed | State::Failed => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use State::*;

    const ALL: [State; 5] = [Pending, Scheduled, Running, Completed, Failed];

    #[test]
    fn accepts_exactly_the_table() {
        let legal = [
            (Pending, Scheduled),
            (Scheduled, Scheduled),
            (Scheduled, Running),
            (Scheduled, Failed),
            (Running, Running),
            (Running, Completed),
            (Running, Failed),
        ];
        for src in ALL {
            for dst in ALL {
                let expected = legal.contains(&(src, dst));
                assert_eq!(
                    valid_state_transition(&src, &dst),
                    expected,
                    "{src} -> {dst}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        for src in [Completed, Failed] {
            for dst in ALL {
                assert!(!valid_state_transition(&src, &dst));
            }
        }
    }

    #[test]
    fn pending_only_schedules() {
        assert!(valid_state_transition(&Pending, &Scheduled));
        assert!(!valid_state_transition(&Pending, &Running));
        assert!(!valid_state_transition(&Pending, &Pending));
    }
}
