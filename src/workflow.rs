use crate::models::BugStatus;

/// Statuses a bug can be moved into from its current one, in the order the
/// transition buttons are rendered. No status is terminal; a closed bug can
/// be reopened. The table only drives the menu shown to developers; the
/// server is the authority on what it actually accepts.
pub fn next_statuses(current: BugStatus) -> &'static [BugStatus] {
    use BugStatus::*;
    match current {
        Open => &[InProgress, Closed],
        InProgress => &[Resolved, Open, Closed],
        Resolved => &[Closed, InProgress],
        Closed => &[Open, InProgress],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BugStatus::*;

    #[test]
    fn in_progress_options_in_render_order() {
        assert_eq!(next_statuses(InProgress), &[Resolved, Open, Closed]);
    }

    #[test]
    fn open_and_resolved_options() {
        assert_eq!(next_statuses(Open), &[InProgress, Closed]);
        assert_eq!(next_statuses(Resolved), &[Closed, InProgress]);
    }

    #[test]
    fn closed_is_not_terminal() {
        assert_eq!(next_statuses(Closed), &[Open, InProgress]);
    }

    #[test]
    fn every_status_has_somewhere_to_go() {
        for s in [Open, InProgress, Resolved, Closed] {
            assert!(!next_statuses(s).is_empty());
            assert!(!next_statuses(s).contains(&s));
        }
    }
}
