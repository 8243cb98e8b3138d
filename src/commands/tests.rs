//! Commands Module Tests
//!
//! ## Test Scopes
//! - **Put**: plain, conditional and delta writes against a checked-out entry.
//! - **Remove**: unconditional and value-conditional removal.
//! - **Notifications**: pre/post ordering and suppression.
//! - **Wire Form**: parameter tuples, command ids and display strings.

#[cfg(test)]
mod tests {
    use crate::commands::parameters::Parameter;
    use crate::commands::{
        ClusteredGetCommand, Flag, FlagSet, InvalidateL1Command, PutKeyValueCommand, RemoveCommand,
        ReplicableCommand, StateRequestCommand, WriteResult,
    };
    use crate::container::{AtomicMapDelta, CacheValue, InternalCacheEntry, MvccEntry, Payload};
    use crate::context::InvocationContext;
    use crate::error::GridError;
    use crate::test_support::{RecordingNotifier, text};
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn put(key: &str, value: &str) -> PutKeyValueCommand {
        PutKeyValueCommand::new(key, Payload::Value(text(value)))
    }

    fn ctx_with(key: &str, value: Option<&str>) -> InvocationContext {
        let mut ctx = InvocationContext::local();
        let entry = match value {
            Some(value) => MvccEntry::from_stored(&InternalCacheEntry::new(key, text(value))),
            None => MvccEntry::absent(key),
        };
        ctx.put_entry(entry, None);
        ctx
    }

    fn stored(ctx: &InvocationContext, key: &str) -> Option<CacheValue> {
        ctx.lookup_entry(key).and_then(|entry| entry.to_stored()).map(|e| e.value)
    }

    // ============================================================
    // PUT TESTS
    // ============================================================

    #[test]
    fn test_put_on_absent_entry_returns_no_previous_value() {
        let notifier = RecordingNotifier::default();
        let mut ctx = ctx_with("k", None);

        let result = put("k", "v1").perform(&mut ctx, &notifier);

        assert_eq!(result, WriteResult::applied(None));
        assert_eq!(stored(&ctx, "k"), Some(text("v1")));
    }

    #[test]
    fn test_put_then_put_if_absent_keeps_first_value() {
        let notifier = RecordingNotifier::default();
        let mut ctx = ctx_with("k", None);

        let first = put("k", "v1").perform(&mut ctx, &notifier);
        let second = put("k", "v2").if_absent().perform(&mut ctx, &notifier);

        assert_eq!(first, WriteResult::applied(None));
        assert_eq!(second, WriteResult::rejected(Some(text("v1"))));
        assert_eq!(stored(&ctx, "k"), Some(text("v1")));
    }

    #[test]
    fn test_rejected_put_if_absent_neither_mutates_nor_notifies() {
        let notifier = RecordingNotifier::default();
        let mut ctx = ctx_with("k", Some("v1"));

        put("k", "v2").if_absent().perform(&mut ctx, &notifier);

        assert!(!ctx.lookup_entry("k").unwrap().is_changed());
        assert!(notifier.events().is_empty());
    }

    #[test]
    fn test_put_replaces_and_returns_previous_value() {
        let notifier = RecordingNotifier::default();
        let mut ctx = ctx_with("k", Some("old"));

        let result = put("k", "new").perform(&mut ctx, &notifier);

        assert_eq!(result, WriteResult::applied(Some(text("old"))));
        assert_eq!(stored(&ctx, "k"), Some(text("new")));
    }

    #[test]
    fn test_put_over_removed_entry_resurrects_it() {
        let notifier = RecordingNotifier::default();
        let mut ctx = InvocationContext::local();
        let mut entry = MvccEntry::from_stored(&InternalCacheEntry::new("k", text("gone")));
        entry.set_removed(true);
        entry.set_valid(false);
        ctx.put_entry(entry, None);

        let result = put("k", "back").perform(&mut ctx, &notifier);

        assert_eq!(result, WriteResult::applied(None));
        let entry = ctx.lookup_entry("k").unwrap();
        assert!(!entry.is_removed());
        assert!(entry.is_valid());
        assert_eq!(stored(&ctx, "k"), Some(text("back")));
    }

    #[test]
    fn test_put_if_absent_over_removed_entry_applies() {
        let notifier = RecordingNotifier::default();
        let mut ctx = InvocationContext::local();
        let mut entry = MvccEntry::from_stored(&InternalCacheEntry::new("k", text("gone")));
        entry.set_removed(true);
        ctx.put_entry(entry, None);

        let result = put("k", "v").if_absent().perform(&mut ctx, &notifier);

        assert!(result.successful);
        assert_eq!(stored(&ctx, "k"), Some(text("v")));
    }

    #[test]
    fn test_put_without_wrapped_entry() {
        let notifier = RecordingNotifier::default();
        let mut ctx = InvocationContext::local();

        let plain = put("k", "v").perform(&mut ctx, &notifier);
        let external = put("k", "v")
            .if_absent()
            .with_flag(Flag::PutForExternalRead)
            .perform(&mut ctx, &notifier);

        assert_eq!(plain, WriteResult::applied(None));
        assert_eq!(external, WriteResult::rejected(None));
        assert!(notifier.events().is_empty());
    }

    #[test]
    fn test_put_sets_lifespan_and_max_idle() {
        let notifier = RecordingNotifier::default();
        let mut ctx = ctx_with("k", None);

        put("k", "v")
            .with_lifespan(Some(5_000))
            .with_max_idle(Some(1_000))
            .perform(&mut ctx, &notifier);

        let entry = ctx.lookup_entry("k").unwrap();
        assert_eq!(entry.lifespan_ms(), Some(5_000));
        assert_eq!(entry.max_idle_ms(), Some(1_000));
    }

    #[test]
    fn test_delta_merges_into_stored_map() {
        let notifier = RecordingNotifier::default();
        let mut ctx = ctx_with("m", None);
        let first = AtomicMapDelta::new().put("a", "1").put("b", "2");
        let second = AtomicMapDelta::new().remove("a").put("c", "3");

        PutKeyValueCommand::new("m", Payload::Delta(first)).perform(&mut ctx, &notifier);
        let before = stored(&ctx, "m");
        let result =
            PutKeyValueCommand::new("m", Payload::Delta(second)).perform(&mut ctx, &notifier);

        assert_eq!(result.previous, before);
        let Some(CacheValue::Map(map)) = stored(&ctx, "m") else {
            panic!("expected a map");
        };
        assert_eq!(map.get("a"), None);
        assert_eq!(map.get("b").map(String::as_str), Some("2"));
        assert_eq!(map.get("c").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_delta_over_non_map_value_starts_from_empty_map() {
        let notifier = RecordingNotifier::default();
        let mut ctx = ctx_with("m", Some("plain"));

        let result = PutKeyValueCommand::new("m", Payload::Delta(AtomicMapDelta::new().put("x", "1")))
            .perform(&mut ctx, &notifier);

        assert_eq!(result.previous, Some(text("plain")));
        let Some(CacheValue::Map(map)) = stored(&ctx, "m") else {
            panic!("expected a map");
        };
        assert_eq!(map.len(), 1);
    }

    // ============================================================
    // NOTIFICATION TESTS
    // ============================================================

    #[test]
    fn test_put_notifies_pre_with_old_then_post_with_new() {
        let notifier = RecordingNotifier::default();
        let mut ctx = ctx_with("k", Some("old"));

        put("k", "new").perform(&mut ctx, &notifier);

        assert_eq!(
            notifier.events(),
            vec![
                ("k".to_string(), Some(text("old")), true),
                ("k".to_string(), Some(text("new")), false),
            ]
        );
    }

    #[test]
    fn test_skip_listener_notification_suppresses_events() {
        let notifier = RecordingNotifier::default();
        let mut ctx = ctx_with("k", None);

        put("k", "v")
            .with_flag(Flag::SkipListenerNotification)
            .perform(&mut ctx, &notifier);

        assert!(notifier.events().is_empty());
        assert_eq!(stored(&ctx, "k"), Some(text("v")));
    }

    // ============================================================
    // REMOVE TESTS
    // ============================================================

    #[test]
    fn test_remove_returns_previous_and_marks_removed() {
        let notifier = RecordingNotifier::default();
        let mut ctx = ctx_with("k", Some("v"));

        let result = RemoveCommand::new("k").perform(&mut ctx, &notifier);

        assert_eq!(result, WriteResult::applied(Some(text("v"))));
        let entry = ctx.lookup_entry("k").unwrap();
        assert!(entry.is_removed());
        assert!(entry.to_stored().is_none());
        assert_eq!(
            notifier.events(),
            vec![
                ("k".to_string(), Some(text("v")), true),
                ("k".to_string(), None, false),
            ]
        );
    }

    #[test]
    fn test_remove_of_missing_key() {
        let notifier = RecordingNotifier::default();
        let mut ctx = ctx_with("k", None);

        let plain = RemoveCommand::new("k").perform(&mut ctx, &notifier);
        let conditional = RemoveCommand::new("k")
            .if_value(text("v"))
            .perform(&mut ctx, &notifier);

        assert_eq!(plain, WriteResult::applied(None));
        assert_eq!(conditional, WriteResult::rejected(None));
        assert!(notifier.events().is_empty());
    }

    #[test]
    fn test_conditional_remove_requires_matching_value() {
        let notifier = RecordingNotifier::default();
        let mut ctx = ctx_with("k", Some("v"));

        let mismatch = RemoveCommand::new("k")
            .if_value(text("other"))
            .perform(&mut ctx, &notifier);
        assert_eq!(mismatch, WriteResult::rejected(Some(text("v"))));
        assert!(!ctx.lookup_entry("k").unwrap().is_removed());

        let matching = RemoveCommand::new("k")
            .if_value(text("v"))
            .perform(&mut ctx, &notifier);
        assert!(matching.successful);
        assert!(ctx.lookup_entry("k").unwrap().is_removed());
    }

    // ============================================================
    // WIRE FORM TESTS
    // ============================================================

    #[test]
    fn test_put_parameters_follow_fixed_order_and_drop_local_flags() {
        let command = put("k", "v")
            .if_absent()
            .with_lifespan(Some(10))
            .with_flag(Flag::CacheModeLocal)
            .with_flag(Flag::SkipListenerNotification);

        let params = command.parameters();

        assert_eq!(
            params,
            vec![
                Parameter::Key("k".to_string()),
                Parameter::Payload(Payload::Value(text("v"))),
                Parameter::Millis(Some(10)),
                Parameter::Millis(None),
                Parameter::Bool(true),
                Parameter::Flags(FlagSet::from([Flag::SkipListenerNotification])),
            ]
        );

        let rebuilt =
            ReplicableCommand::from_parameters(PutKeyValueCommand::COMMAND_ID, params).unwrap();
        let mut expected = command.clone();
        expected.flags.remove(&Flag::CacheModeLocal);
        assert_eq!(rebuilt, ReplicableCommand::PutKeyValue(expected));
    }

    #[test]
    fn test_command_from_wrong_id_is_rejected() {
        let params = put("k", "v").parameters();

        let wrong_id = PutKeyValueCommand::from_parameters(RemoveCommand::COMMAND_ID, params.clone());
        let unknown = ReplicableCommand::from_parameters(99, params);

        assert!(matches!(wrong_id, Err(GridError::InvalidCommand(_))));
        assert!(matches!(unknown, Err(GridError::InvalidCommand(_))));
    }

    #[test]
    fn test_malformed_parameters_are_rejected() {
        let truncated = vec![Parameter::Key("k".to_string())];
        let extra = {
            let mut params = RemoveCommand::new("k").parameters();
            params.push(Parameter::Bool(false));
            params
        };

        assert!(matches!(
            ReplicableCommand::from_parameters(PutKeyValueCommand::COMMAND_ID, truncated),
            Err(GridError::InvalidCommand(_))
        ));
        assert!(matches!(
            ReplicableCommand::from_parameters(RemoveCommand::COMMAND_ID, extra),
            Err(GridError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_command_ids() {
        let get = ClusteredGetCommand::new("k", &FlagSet::new(), false, None);

        assert_eq!(ReplicableCommand::PutKeyValue(put("k", "v")).command_id(), 8);
        assert_eq!(ReplicableCommand::Remove(RemoveCommand::new("k")).command_id(), 10);
        assert_eq!(
            ReplicableCommand::StateRequest(StateRequestCommand::new(vec![1], 3)).command_id(),
            15
        );
        assert_eq!(ReplicableCommand::ClusteredGet(get).command_id(), 16);
    }

    #[test]
    fn test_backup_form_is_unconditional() {
        let conditional_put = ReplicableCommand::PutKeyValue(put("k", "v").if_absent());
        let conditional_remove = ReplicableCommand::Remove(RemoveCommand::new("k").if_value(text("v")));

        let ReplicableCommand::PutKeyValue(put_backup) = conditional_put.to_backup() else {
            panic!("expected a put");
        };
        let ReplicableCommand::Remove(remove_backup) = conditional_remove.to_backup() else {
            panic!("expected a remove");
        };

        assert!(!put_backup.is_conditional());
        assert!(!remove_backup.is_conditional());
        assert!(conditional_put.is_write());
    }

    #[test]
    fn test_clustered_get_drops_non_remotable_flags() {
        let flags = FlagSet::from([Flag::SkipRemoteLookup, Flag::SkipListenerNotification]);

        let get = ClusteredGetCommand::new("k", &flags, false, None);

        assert_eq!(get.flags, FlagSet::from([Flag::SkipListenerNotification]));
    }

    fn hash_of(command: &PutKeyValueCommand) -> u64 {
        let mut hasher = DefaultHasher::new();
        command.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_put_equality_covers_every_field() {
        let base = put("k", "v");
        let variants = [
            put("other", "v"),
            put("k", "other"),
            put("k", "v").if_absent(),
            put("k", "v").with_lifespan(Some(100)),
            put("k", "v").with_max_idle(Some(100)),
            put("k", "v").with_flag(Flag::SkipListenerNotification),
        ];

        assert_eq!(base, put("k", "v"));
        assert_eq!(hash_of(&base), hash_of(&put("k", "v")));
        for variant in &variants {
            assert_ne!(&base, variant);
            assert_ne!(hash_of(&base), hash_of(variant), "{}", variant);
        }
    }

    #[test]
    fn test_invalidate_l1_parameters_round_trip() {
        let command = InvalidateL1Command::new(["a", "b"]);

        let rebuilt = ReplicableCommand::from_parameters(
            InvalidateL1Command::COMMAND_ID,
            command.parameters(),
        )
        .unwrap();

        assert_eq!(rebuilt, ReplicableCommand::InvalidateL1(command));
        assert_eq!(rebuilt.command_id(), 7);
        assert!(!rebuilt.is_write());
    }

    #[test]
    fn test_put_display() {
        let command = put("k", "v").with_lifespan(Some(100));

        assert_eq!(
            command.to_string(),
            "PutKeyValueCommand{key=k, value=\"v\", flags={}, put_if_absent=false, lifespan_ms=Some(100), max_idle_ms=None}"
        );
    }
}
