//! Front authorization.

#[cfg(test)]
mod tests {
    use bustunnel_transfer::blob_name;
    use bytes::Bytes;

    use crate::Node;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_reject_request_without_authorization() {
        let node = Node::start_with(|mut c| {
            c.require_authorization = true;
            c
        })
        .await
        .expect("start node");

        let resp = node
            .begin_download(&node.path("a.bin"))
            .await
            .expect("begin download");
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

        node.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_carry_caller_authorization_through_the_bus() {
        let node = Node::start_with(|mut c| {
            c.require_authorization = true;
            c.chunk_size = 8;
            c
        })
        .await
        .expect("start node");
        let dest = node.path("secured.bin");
        node.store
            .put_blob(
                &blob_name(&dest.display().to_string()),
                Bytes::from_static(b"tunneled with caller credentials"),
            )
            .await
            .expect("seed blob");

        let resp = node
            .client()
            .get(node.url("/api/transfer/download", &dest))
            .header("authorization", "Bearer integration")
            .send()
            .await
            .expect("begin download");
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

        // Replayed chunk and stitch requests only pass the interceptor if
        // the caller's header travelled with every message.
        node.wait_for_download(&dest).await.expect("download");
        assert_eq!(
            tokio::fs::read(&dest).await.expect("read"),
            b"tunneled with caller credentials"
        );
        assert!(node.bus.dead_letters().is_empty());

        node.shutdown().await.expect("shutdown");
    }
}
