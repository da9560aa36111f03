//! Unit tests for conditions module

#[cfg(test)]
mod tests {
    use crate::conditions::{creation_failed, set_condition};
    use chrono::{Duration, TimeZone, Utc};
    use crds::{ConditionStatus, ProviderCondition, CONDITION_FAILURE};

    #[test]
    fn test_new_condition_is_stamped() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut conditions = Vec::new();
        set_condition(&mut conditions, creation_failed("boom"), now);

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].condition_type, CONDITION_FAILURE);
        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert_eq!(conditions[0].message, "boom");
        assert_eq!(conditions[0].last_probe_time, Some(now));
        assert_eq!(conditions[0].last_transition_time, Some(now));
    }

    #[test]
    fn test_same_type_replaces_in_place() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let t1 = t0 + Duration::seconds(30);
        let mut conditions = Vec::new();
        set_condition(&mut conditions, creation_failed("first"), t0);
        set_condition(&mut conditions, creation_failed("second"), t1);

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].message, "second");
        assert_eq!(conditions[0].last_probe_time, Some(t1));
        // status did not change
        assert_eq!(conditions[0].last_transition_time, Some(t0));
    }

    #[test]
    fn test_status_flip_moves_transition_time() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let t1 = t0 + Duration::minutes(5);
        let mut conditions = Vec::new();
        set_condition(&mut conditions, creation_failed("boom"), t0);
        set_condition(
            &mut conditions,
            ProviderCondition::new(CONDITION_FAILURE, ConditionStatus::False, "MachineCreationSucceeded", ""),
            t1,
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, ConditionStatus::False);
        assert_eq!(conditions[0].last_transition_time, Some(t1));
    }

    #[test]
    fn test_distinct_types_coexist() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut conditions = Vec::new();
        set_condition(&mut conditions, creation_failed("boom"), now);
        set_condition(&mut conditions, ProviderCondition::new("Ready", ConditionStatus::True, "", ""), now);
        assert_eq!(conditions.len(), 2);
    }
}
