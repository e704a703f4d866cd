//! # Concurrent Publishing and Dispatch
//!
//! Several publishers and dispatchers sharing one store and one handler
//! registry.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use typed_bus::HandlerMode;

    use crate::integration::support::{settle, Ack, Pair, Ping};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_publishers_lose_nothing() {
        let pair = Pair::new();
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

        let mut tasks = Vec::new();
        for worker in 0..8u64 {
            let publisher = pair.sender.publisher();
            tasks.push(tokio::spawn(async move {
                for i in 0..50u64 {
                    publisher.publish(&Ping { seq: worker * 1000 + i }).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        settle(&running, 400).await;

        assert_eq!(hits.load(Ordering::SeqCst), 400);
        assert_eq!(pair.store.dropped(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_time_handler_shared_by_two_dispatchers() {
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

        // Both dispatchers see every message and race for the one-time slot.
        let first = pair.receiver.register().await.unwrap();
        let second = pair.receiver.register().await.unwrap();

        for i in 0..20 {
            pair.sender.publish(&Ack { id: format!("ack-{i}") }).await;
        }
        settle(&first, 20).await;
        settle(&second, 20).await;

        assert_eq!(once.load(Ordering::SeqCst), 1);
        assert_eq!(always.load(Ordering::SeqCst), 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_registration_while_dispatching() {
        let pair = Pair::new();
        let running = pair.receiver.register().await.unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let publisher = pair.sender.publisher();
        let publishing = tokio::spawn(async move {
            for seq in 0..200u64 {
                publisher.publish(&Ping { seq }).await;
                tokio::task::yield_now().await;
            }
        });

        for _ in 0..10 {
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
            tokio::task::yield_now().await;
        }
        publishing.await.unwrap();
        settle(&running, 200).await;

        assert_eq!(pair.receiver.handlers().handler_count("it.Ping"), 10);
        // Deliveries after the last registration reach all ten handlers.
        let before = hits.load(Ordering::SeqCst);
        pair.sender.publish(&Ping { seq: 999 }).await;
        settle(&running, 201).await;
        assert_eq!(hits.load(Ordering::SeqCst), before + 10);
    }
}
