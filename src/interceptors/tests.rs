//! Interceptor Chain Tests
//!
//! ## Test Scopes
//! - **Chain**: stage ordering and the missing terminal stage.
//! - **Entry Wrapping**: locking, commit on success, discard on failure.
//! - **Distribution**: forwarding to the primary, replication to backups under
//!   the key lock, and L1 invalidation.

#[cfg(test)]
mod tests {
    use crate::commands::{
        CommandResult, Flag, InvalidateL1Command, PutKeyValueCommand, RemoveCommand,
        ReplicableCommand, WriteResult,
    };
    use crate::container::{DataContainer, InternalCacheEntry, LockManager, Payload};
    use crate::context::InvocationContext;
    use crate::distribution::{CacheTopology, ConsistentHash, DistributionManager, TopologyManager};
    use crate::error::{GridError, Result};
    use crate::interceptors::{
        CallInterceptor, DistributionInterceptor, EntryWrappingInterceptor, Interceptor,
        InterceptorChain, Next,
    };
    use crate::remoting::{BoxFuture, Invocation, Response, ResponseMode};
    use crate::test_support::{MockTransport, RecordingNotifier, addr, text};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records its name, then defers to the rest of the chain.
    struct Tracer {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Interceptor for Tracer {
        fn visit<'a>(
            &'a self,
            ctx: &'a mut InvocationContext,
            invocation: &'a Invocation,
            next: Next<'a>,
        ) -> BoxFuture<'a, Result<CommandResult>> {
            Box::pin(async move {
                self.log.lock().unwrap().push(self.name);
                next.invoke(ctx, invocation).await
            })
        }
    }

    /// Terminal stage that always fails.
    struct Failing;

    impl Interceptor for Failing {
        fn visit<'a>(
            &'a self,
            _ctx: &'a mut InvocationContext,
            _invocation: &'a Invocation,
            _next: Next<'a>,
        ) -> BoxFuture<'a, Result<CommandResult>> {
            Box::pin(async { Err(GridError::Transport("link down".to_string())) })
        }
    }

    struct Node {
        transport: Arc<MockTransport>,
        container: Arc<DataContainer>,
        locks: Arc<LockManager>,
        chain: InterceptorChain,
    }

    /// Node `local` in a one-segment topology owned by `owners`, running the
    /// full distribution chain.
    fn node(local: &str, owners: &[&str]) -> Node {
        let topology = Arc::new(TopologyManager::new(addr(local), owners.len(), 1, true).unwrap());
        let ch = ConsistentHash::from_segment_owners(vec![
            owners.iter().map(|owner| addr(owner)).collect(),
        ])
        .unwrap();
        topology.install(CacheTopology::steady(2, ch));

        let mut members: Vec<_> = owners.iter().map(|owner| addr(owner)).collect();
        members.push(addr(local));
        let transport = MockTransport::new(addr(local), members);
        let dm = Arc::new(DistributionManager::new(
            topology,
            transport.clone(),
            Duration::from_millis(500),
            1_000,
        ));

        let container = Arc::new(DataContainer::new(1));
        let locks = Arc::new(LockManager::new(Duration::from_millis(100)));
        let stages: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(EntryWrappingInterceptor::new(container.clone(), locks.clone())),
            Arc::new(DistributionInterceptor::new(dm, true)),
            Arc::new(CallInterceptor::new(
                container.clone(),
                Arc::new(RecordingNotifier::default()),
            )),
        ];

        Node {
            transport,
            container,
            locks,
            chain: InterceptorChain::new(stages),
        }
    }

    fn put(key: &str, value: &str) -> Invocation {
        Invocation::new(ReplicableCommand::PutKeyValue(PutKeyValueCommand::new(
            key,
            Payload::Value(text(value)),
        )))
    }

    fn write_result(result: CommandResult) -> WriteResult {
        match result {
            CommandResult::Write(write) => write,
            other => panic!("expected a write result, got {:?}", other),
        }
    }

    // ============================================================
    // CHAIN TESTS
    // ============================================================

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stages: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Tracer {
                name: "first",
                log: log.clone(),
            }),
            Arc::new(Tracer {
                name: "second",
                log: log.clone(),
            }),
            Arc::new(CallInterceptor::new(
                Arc::new(DataContainer::new(1)),
                Arc::new(RecordingNotifier::default()),
            )),
        ];
        let chain = InterceptorChain::new(stages);

        let result = chain
            .invoke(&mut InvocationContext::local(), &put("k", "v"))
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        // Nothing wrapped the entry, so the put ran against an empty context.
        assert_eq!(write_result(result), WriteResult::applied(None));
        assert_eq!(chain.len(), 3);
    }

    #[tokio::test]
    async fn test_chain_without_terminal_stage_fails() {
        let chain = InterceptorChain::new(Vec::new());

        let result = chain.invoke(&mut InvocationContext::local(), &put("k", "v")).await;

        assert!(chain.is_empty());
        assert!(matches!(result, Err(GridError::InvalidCommand(_))));
    }

    // ============================================================
    // ENTRY WRAPPING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_successful_write_is_committed_and_lock_released() {
        let node = node("A", &["A"]);

        let result = node
            .chain
            .invoke(&mut InvocationContext::local(), &put("k", "v"))
            .await
            .unwrap();

        assert!(write_result(result).successful);
        assert_eq!(node.container.get("k").map(|e| e.value), Some(text("v")));
        assert!(!node.locks.is_locked("k"));
    }

    #[tokio::test]
    async fn test_remove_deletes_from_container() {
        let node = node("A", &["A"]);
        node.container.put(InternalCacheEntry::new("k", text("v")));
        let remove = Invocation::new(ReplicableCommand::Remove(RemoveCommand::new("k")));

        let result = node
            .chain
            .invoke(&mut InvocationContext::local(), &remove)
            .await
            .unwrap();

        assert_eq!(write_result(result).previous, Some(text("v")));
        assert!(!node.container.contains_key("k"));
    }

    #[tokio::test]
    async fn test_failed_write_is_discarded_and_lock_released() {
        let container = Arc::new(DataContainer::new(1));
        let locks = Arc::new(LockManager::new(Duration::from_millis(100)));
        let stages: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(EntryWrappingInterceptor::new(container.clone(), locks.clone())),
            Arc::new(Failing),
        ];
        let chain = InterceptorChain::new(stages);
        let mut ctx = InvocationContext::local();

        let result = chain.invoke(&mut ctx, &put("k", "v")).await;

        assert!(result.is_err());
        assert!(!container.contains_key("k"));
        assert!(ctx.lookup_entry("k").is_none());
        assert!(!locks.is_locked("k"));
    }

    #[tokio::test]
    async fn test_write_waits_for_lock_and_times_out() {
        let node = node("A", &["A"]);
        let _held = node.locks.lock("k").await.unwrap();

        let result = node
            .chain
            .invoke(&mut InvocationContext::local(), &put("k", "v"))
            .await;

        assert!(matches!(result, Err(GridError::LockTimeout { .. })));
    }

    #[tokio::test]
    async fn test_external_read_put_skips_busy_key() {
        let node = node("A", &["A"]);
        let held = node.locks.lock("k").await.unwrap();
        let pfer = Invocation::new(ReplicableCommand::PutKeyValue(
            PutKeyValueCommand::new("k", Payload::Value(text("v")))
                .if_absent()
                .with_flag(Flag::PutForExternalRead),
        ));

        let result = node
            .chain
            .invoke(&mut InvocationContext::local(), &pfer)
            .await
            .unwrap();

        assert_eq!(write_result(result), WriteResult::rejected(None));
        drop(held);
        assert!(!node.container.contains_key("k"));
    }

    // ============================================================
    // DISTRIBUTION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_local_write_on_non_primary_is_forwarded() {
        // ARRANGE
        let node = node("A", &["B", "A"]);
        node.transport.respond_with(|_, _| {
            Some(Response::Successful(CommandResult::Write(WriteResult::applied(Some(text("old"))))))
        });
        let invocation = put("k", "v");

        // ACT
        let result = node
            .chain
            .invoke(&mut InvocationContext::local(), &invocation)
            .await
            .unwrap();

        // ASSERT
        assert_eq!(write_result(result), WriteResult::applied(Some(text("old"))));
        assert!(!node.container.contains_key("k"));
        let sent = node.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].targets, vec![addr("B")]);
        assert_eq!(sent[0].mode, ResponseMode::Synchronous);
        assert_eq!(sent[0].invocation, invocation);
    }

    #[tokio::test]
    async fn test_forward_answers_map_to_results() {
        let node = node("A", &["B"]);

        node.transport.respond_with(|_, _| Some(Response::Unsuccessful));
        let unsuccessful = node
            .chain
            .invoke(&mut InvocationContext::local(), &put("k", "v"))
            .await
            .unwrap();
        assert_eq!(unsuccessful, CommandResult::Empty);

        node.transport
            .respond_with(|_, _| Some(Response::Exception("no space".to_string())));
        let failed = node
            .chain
            .invoke(&mut InvocationContext::local(), &put("k", "v"))
            .await;
        assert_eq!(
            failed,
            Err(GridError::RemoteException {
                address: addr("B"),
                message: "no space".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_primary_applies_then_replicates_backup_form() {
        let node = node("A", &["A", "B", "C"]);
        node.transport.respond_with(|_, _| {
            Some(Response::Successful(CommandResult::Write(WriteResult::applied(None))))
        });
        let invocation = Invocation::new(ReplicableCommand::PutKeyValue(
            PutKeyValueCommand::new("k", Payload::Value(text("v"))).if_absent(),
        ));

        let result = node
            .chain
            .invoke(&mut InvocationContext::local(), &invocation)
            .await
            .unwrap();

        assert!(write_result(result).successful);
        assert_eq!(node.container.get("k").map(|e| e.value), Some(text("v")));

        let sent = node.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].targets, vec![addr("B"), addr("C")]);
        assert_eq!(sent[0].invocation.op_id, invocation.op_id);
        let ReplicableCommand::PutKeyValue(backup) = &sent[0].invocation.command else {
            panic!("expected a put");
        };
        assert!(!backup.put_if_absent);
    }

    #[tokio::test]
    async fn test_rejected_write_is_not_replicated() {
        let node = node("A", &["A", "B"]);
        node.container.put(InternalCacheEntry::new("k", text("v1")));
        let invocation = Invocation::new(ReplicableCommand::PutKeyValue(
            PutKeyValueCommand::new("k", Payload::Value(text("v2"))).if_absent(),
        ));

        let result = node
            .chain
            .invoke(&mut InvocationContext::local(), &invocation)
            .await
            .unwrap();

        assert_eq!(write_result(result), WriteResult::rejected(Some(text("v1"))));
        assert!(node.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failed_replication_fails_the_write() {
        let node = node("A", &["A", "B"]);
        node.transport
            .respond_with(|_, _| Some(Response::Exception("backup down".to_string())));

        let result = node
            .chain
            .invoke(&mut InvocationContext::local(), &put("k", "v"))
            .await;

        assert!(matches!(result, Err(GridError::RemoteException { .. })));
        assert!(!node.container.contains_key("k"));
        assert!(!node.locks.is_locked("k"));
    }

    #[tokio::test]
    async fn test_primary_holds_key_lock_while_replicating() {
        // ARRANGE: the backup notes whether the primary still holds the key
        let node = node("A", &["A", "B"]);
        let locks = node.locks.clone();
        let seen_locked = Arc::new(Mutex::new(Vec::new()));
        let seen = seen_locked.clone();
        node.transport.respond_with(move |_, _| {
            seen.lock().unwrap().push(locks.is_locked("k"));
            Some(Response::Successful(CommandResult::Write(WriteResult::applied(None))))
        });

        // ACT
        node.chain
            .invoke(&mut InvocationContext::local(), &put("k", "v"))
            .await
            .unwrap();

        // ASSERT
        assert_eq!(*seen_locked.lock().unwrap(), vec![true]);
        assert!(!node.locks.is_locked("k"));
    }

    #[tokio::test]
    async fn test_forwarding_node_does_not_hold_key_lock() {
        let node = node("A", &["B", "A"]);
        let locks = node.locks.clone();
        let seen_locked = Arc::new(Mutex::new(Vec::new()));
        let seen = seen_locked.clone();
        node.transport.respond_with(move |_, _| {
            seen.lock().unwrap().push(locks.is_locked("k"));
            Some(Response::Successful(CommandResult::Write(WriteResult::applied(None))))
        });

        node.chain
            .invoke(&mut InvocationContext::local(), &put("k", "v"))
            .await
            .unwrap();

        assert_eq!(*seen_locked.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_primary_invalidates_l1_on_non_owners() {
        // ARRANGE: C is a member but owns nothing
        let node = node("A", &["A", "B"]);
        node.transport.set_members(vec![addr("A"), addr("B"), addr("C")]);
        node.transport.respond_with(|_, _| {
            Some(Response::Successful(CommandResult::Write(WriteResult::applied(None))))
        });

        // ACT
        node.chain
            .invoke(&mut InvocationContext::local(), &put("k", "v"))
            .await
            .unwrap();

        // ASSERT: backup first, then the invalidation to the non-owner
        let sent = node.transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].targets, vec![addr("B")]);
        assert_eq!(sent[1].targets, vec![addr("C")]);
        assert_eq!(
            sent[1].invocation.command,
            ReplicableCommand::InvalidateL1(InvalidateL1Command::new(["k"]))
        );
    }

    #[tokio::test]
    async fn test_rejected_write_does_not_invalidate_l1() {
        let node = node("A", &["A"]);
        node.transport.set_members(vec![addr("A"), addr("C")]);
        node.container.put(InternalCacheEntry::new("k", text("v1")));
        let invocation = Invocation::new(ReplicableCommand::PutKeyValue(
            PutKeyValueCommand::new("k", Payload::Value(text("v2"))).if_absent(),
        ));

        node.chain
            .invoke(&mut InvocationContext::local(), &invocation)
            .await
            .unwrap();

        assert!(node.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_replicated_write_is_applied_by_backup() {
        let node = node("B", &["A", "B"]);

        let result = node
            .chain
            .invoke(&mut InvocationContext::remote(addr("A")), &put("k", "v"))
            .await
            .unwrap();

        assert!(write_result(result).successful);
        assert_eq!(node.container.get("k").map(|e| e.value), Some(text("v")));
        assert!(node.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_local_mode_write_stays_on_node() {
        let node = node("A", &["B"]);
        let invocation = Invocation::new(ReplicableCommand::PutKeyValue(
            PutKeyValueCommand::new("k", Payload::Value(text("v"))).with_flag(Flag::CacheModeLocal),
        ));

        node.chain
            .invoke(&mut InvocationContext::local(), &invocation)
            .await
            .unwrap();

        assert!(node.container.contains_key("k"));
        assert!(node.transport.sent().is_empty());
    }
}
