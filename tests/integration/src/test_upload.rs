//! Local file to blob transfers.

#[cfg(test)]
mod tests {
    use bustunnel_transfer::blob_name;

    use std::time::Duration;

    use crate::{MIB, Node, pattern, wait_until};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_upload_file_into_blob() {
        let node = Node::start().await.expect("start node");
        let source = node.path("report final.bin");
        let data = pattern(5 * MIB / 2);
        tokio::fs::write(&source, &data).await.expect("write source");

        let resp = node.begin_upload(&source).await.expect("begin upload");
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        let json: serde_json::Value = resp.json().await.expect("json");
        assert_eq!(json["chunks"], 3);

        let blob = blob_name(&source.display().to_string());
        wait_until(Duration::from_secs(30), || {
            node.store.read_all(&blob).is_ok_and(|b| b.len() == data.len())
        })
        .await
        .expect("all blocks stored");
        let ids: Vec<String> = node
            .store
            .committed_blocks(&blob)
            .expect("committed list")
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            ids,
            ["0000000000000000000", "0000000000000000001", "0000000000000000002"]
        );
        let stored = node.store.read_all(&blob).expect("read blob");
        assert!(stored.as_ref() == data.as_slice(), "blob differs from source");
        assert!(node.bus.dead_letters().is_empty());

        node.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_round_trip_through_blob() {
        let node = Node::start_with(|mut c| {
            c.chunk_size = 64 * 1024;
            c
        })
        .await
        .expect("start node");
        let source = node.path("round.bin");
        let data = pattern(300 * 1024 + 7);
        tokio::fs::write(&source, &data).await.expect("write source");

        let resp = node.begin_upload(&source).await.expect("begin upload");
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        let blob = blob_name(&source.display().to_string());
        wait_until(Duration::from_secs(30), || {
            node.store.read_all(&blob).is_ok_and(|b| b.len() == data.len())
        })
        .await
        .expect("upload stored");

        // Same path: remove the local copy, then pull the blob back.
        tokio::fs::remove_file(&source).await.expect("remove source");
        let resp = node.begin_download(&source).await.expect("begin download");
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        node.wait_for_download(&source).await.expect("download");

        let restored = tokio::fs::read(&source).await.expect("read restored");
        assert!(restored == data, "restored file differs");

        node.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_report_missing_source() {
        let node = Node::start().await.expect("start node");
        let resp = node
            .begin_upload(&node.path("absent.bin"))
            .await
            .expect("begin upload");
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        assert_eq!(node.bus.pending_count(), 0);

        node.shutdown().await.expect("shutdown");
    }
}
