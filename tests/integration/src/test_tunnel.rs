//! Reverse proxy behaviour against the node's own front.

#[cfg(test)]
mod tests {
    use bustunnel_bus::MessageBus;
    use bustunnel_model::{BusMessage, HttpMethod, TunnelRequest};

    use crate::{Node, wait_until};

    fn chunk_request(path: &str) -> TunnelRequest {
        TunnelRequest::builder()
            .host("/")
            .method(HttpMethod::Get)
            .path("/api/filechunk")
            .query_pair("path", path)
            .query_pair("startIndex", "0")
            .query_pair("length", "16")
            .build()
            .expect("request")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_dead_letter_chunk_for_finished_transfer() {
        let node = Node::start().await.expect("start node");
        let path = node.path("done.bin").display().to_string();

        let message = BusMessage::for_request(&chunk_request(&path), Vec::new()).expect("message");
        node.bus.send(message).await.expect("send");

        wait_until(std::time::Duration::from_secs(10), || {
            !node.bus.dead_letters().is_empty()
        })
        .await
        .expect("dead letter");
        let letters = node.bus.dead_letters();
        assert_eq!(letters[0].reason, "upstream status 404");
        assert!(node.bus.completed().is_empty());

        node.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_complete_replayed_health_check() {
        let node = Node::start().await.expect("start node");
        let request = TunnelRequest::builder()
            .host("/")
            .method(HttpMethod::Get)
            .path("/health")
            .query_pair("ping", "1")
            .build()
            .expect("request");
        let message = BusMessage::for_request(&request, Vec::new()).expect("message");
        node.bus.send(message).await.expect("send");

        wait_until(std::time::Duration::from_secs(10), || {
            node.bus.completed().len() == 1
        })
        .await
        .expect("completed");
        assert!(node.bus.dead_letters().is_empty());

        node.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_finish_in_flight_forwards_on_shutdown() {
        let node = Node::start().await.expect("start node");
        let total = 40;
        let messages = (0..total)
            .map(|i| {
                let request = TunnelRequest::builder()
                    .host("/")
                    .method(HttpMethod::Get)
                    .path("/health")
                    .query_pair("seq", i.to_string())
                    .build()
                    .expect("request");
                BusMessage::for_request(&request, Vec::new()).expect("message")
            })
            .collect();
        node.bus.send_batch(messages).await.expect("send");
        wait_until(std::time::Duration::from_secs(10), || {
            !node.bus.completed().is_empty()
        })
        .await
        .expect("first completion");

        let bus = node.bus.clone();
        node.shutdown().await.expect("shutdown");

        assert!(bus.dead_letters().is_empty());
        assert_eq!(bus.in_flight_count(), 0);
        assert_eq!(bus.completed().len() + bus.pending_count(), total);
    }
}
