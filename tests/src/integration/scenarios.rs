//! # Publish/Dispatch Scenarios
//!
//! Typed messages published on one bus and received on another through a
//! shared store, including every drop path of the dispatcher.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tracing_subscriber::layer::SubscriberExt;
    use typed_bus::{BusConfig, DropKind, HandlerMode, MessageBus, PubSubStore};

    use crate::integration::support::{settle, Ack, DropLog, Impostor, Orphan, Pair, Ping};

    // =============================================================================
    // HAPPY PATHS
    // =============================================================================

    #[tokio::test]
    async fn test_ping_reaches_handler_once() {
        let pair = Pair::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        pair.receiver
            .add_handler(
                move |ping: &Ping| {
                    sink.lock().push(ping.clone());
                    Ok(())
                },
                HandlerMode::Persistent,
            )
            .unwrap();
        let running = pair.receiver.register().await.unwrap();

        pair.sender.publish(&Ping { seq: 1 }).await;
        settle(&running, 1).await;

        assert_eq!(*seen.lock(), vec![Ping { seq: 1 }]);
        assert_eq!(running.stats().handler_invocations, 1);
    }

    #[tokio::test]
    async fn test_one_time_ack_fires_once() {
        let pair = Pair::new();
        let once = Arc::new(AtomicUsize::new(0));
        let always = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&once);
        pair.receiver
            .add_one_time_handler(move |_: &Ack| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        let counter = Arc::clone(&always);
        pair.receiver
            .add_handler(
                move |_: &Ack| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                HandlerMode::Persistent,
            )
            .unwrap();
        let running = pair.receiver.register().await.unwrap();

        let ack = Ack { id: "a-1".into() };
        pair.sender.publish(&ack).await;
        pair.sender.publish(&ack).await;
        settle(&running, 2).await;

        assert_eq!(once.load(Ordering::SeqCst), 1);
        assert_eq!(always.load(Ordering::SeqCst), 2);
        assert_eq!(pair.receiver.handlers().handler_count("it.Ack"), 1);
    }

    #[tokio::test]
    async fn test_all_handlers_invoked_in_order() {
        let pair = Pair::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            pair.receiver
                .add_handler(
                    move |_: &Ping| {
                        order.lock().push(tag);
                        Ok(())
                    },
                    HandlerMode::Persistent,
                )
                .unwrap();
        }
        let running = pair.receiver.register().await.unwrap();

        pair.sender.publish(&Ping { seq: 5 }).await;
        settle(&running, 1).await;

        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_registered_type_without_handlers_is_noop() {
        let pair = Pair::new();
        let running = pair.receiver.register().await.unwrap();

        pair.sender.publish(&Ping { seq: 2 }).await;
        settle(&running, 1).await;

        let stats = running.stats();
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.handler_invocations, 0);
        assert_eq!(stats.dropped(), 0);
    }

    #[tokio::test]
    async fn test_publish_without_dispatcher() {
        let pair = Pair::new();
        let receivers = pair.sender.try_publish(&Ping { seq: 3 }).await.unwrap();
        assert_eq!(receivers, 0);
        assert_eq!(pair.sender.publisher().stats().published, 1);
    }

    #[tokio::test]
    async fn test_handler_added_after_register() {
        let pair = Pair::new();
        let running = pair.receiver.register().await.unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        pair.sender.publish(&Ping { seq: 1 }).await;
        settle(&running, 1).await;

        let counter = Arc::clone(&hits);
        pair.receiver
            .add_handler(
                move |_: &Ping| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                HandlerMode::Persistent,
            )
            .unwrap();
        pair.sender.publish(&Ping { seq: 2 }).await;
        settle(&running, 2).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    // =============================================================================
    // DROP PATHS
    // =============================================================================

    /// Current-thread runtime, so the dispatcher task logs into the
    /// thread-local capture.
    #[tokio::test]
    async fn test_unknown_type_dropped_then_next_delivered() {
        let pair = Pair::new();
        let log = DropLog::default();
        let _capture =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(log.clone()));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        pair.receiver
            .add_handler(
                move |_: &Ping| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                HandlerMode::Persistent,
            )
            .unwrap();
        let running = pair.receiver.register().await.unwrap();

        pair.sender.publish(&Orphan { note: "lost".into() }).await;
        pair.sender.publish(&Ping { seq: 9 }).await;
        settle(&running, 2).await;

        let stats = running.stats();
        assert_eq!(stats.dropped_by(DropKind::UnknownType), 1);
        assert_eq!(stats.dropped(), 1);
        assert_eq!(stats.handler_invocations, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(log.entries(), vec!["unknown_type"]);
    }

    #[tokio::test]
    async fn test_bare_prefix_channel_dropped() {
        let pair = Pair::new();
        let running = pair.receiver.register().await.unwrap();

        pair.store.publish("bus:", Vec::new()).await.unwrap();
        settle(&running, 1).await;

        assert_eq!(running.stats().dropped_by(DropKind::UnknownChannel), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_dropped() {
        let pair = Pair::new();
        pair.receiver
            .add_handler(|_: &Ping| Ok(()), HandlerMode::Persistent)
            .unwrap();
        let running = pair.receiver.register().await.unwrap();

        // Too short for a u64.
        pair.store.publish("bus:it.Ping", vec![1, 2]).await.unwrap();
        settle(&running, 1).await;

        let stats = running.stats();
        assert_eq!(stats.dropped_by(DropKind::Decode), 1);
        assert_eq!(stats.handler_invocations, 0);
    }

    #[tokio::test]
    async fn test_identifier_collision_dropped() {
        let pair = Pair::new();
        pair.receiver
            .add_handler(|_: &Impostor| Ok(()), HandlerMode::Persistent)
            .unwrap();
        let running = pair.receiver.register().await.unwrap();

        pair.sender.publish(&Ping { seq: 4 }).await;
        settle(&running, 1).await;

        let stats = running.stats();
        assert_eq!(stats.dropped_by(DropKind::CapabilityMismatch), 1);
        assert_eq!(stats.handler_invocations, 0);
    }

    // =============================================================================
    // NAMESPACING
    // =============================================================================

    #[tokio::test]
    async fn test_prefixes_isolate_buses() {
        let pair = Pair::new();
        let other = MessageBus::new(
            Arc::clone(&pair.store),
            &BusConfig::default().with_prefix("other:"),
        )
        .unwrap();
        other.register_type::<Ping>().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        other
            .add_handler(
                move |_: &Ping| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                HandlerMode::Persistent,
            )
            .unwrap();
        let other_running = other.register().await.unwrap();
        let running = pair.receiver.register().await.unwrap();

        pair.sender.publish(&Ping { seq: 1 }).await;
        settle(&running, 1).await;
        other.publish(&Ping { seq: 2 }).await;
        settle(&other_running, 1).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(other_running.stats().received, 1);
        assert_eq!(running.stats().received, 1);
    }

    #[tokio::test]
    async fn test_store_close_stops_dispatcher() {
        let pair = Pair::new();
        let running = pair.receiver.register().await.unwrap();

        pair.store.close();
        tokio::time::timeout(std::time::Duration::from_secs(5), running.closed())
            .await
            .expect("dispatcher kept running after close");
    }
}
