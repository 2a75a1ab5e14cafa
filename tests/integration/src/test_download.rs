//! Blob to local file transfers.

#[cfg(test)]
mod tests {
    use bustunnel_store::BlockStore;
    use bustunnel_transfer::{StagingArea, blob_name};
    use bytes::Bytes;

    use crate::{MIB, Node, pattern};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_download_blob_in_three_chunks() {
        let node = Node::start().await.expect("start node");
        let dest = node.path("archive.bin");
        let data = pattern(5 * MIB / 2);
        node.store
            .put_blob(&blob_name(&dest.display().to_string()), Bytes::from(data.clone()))
            .await
            .expect("seed blob");

        let resp = node.begin_download(&dest).await.expect("begin download");
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        let json: serde_json::Value = resp.json().await.expect("json");
        assert_eq!(json["chunks"], 3);
        assert_eq!(json["batches"], 2);

        node.wait_for_download(&dest).await.expect("download");
        node.wait_for_idle().await.expect("idle");

        let written = tokio::fs::read(&dest).await.expect("read destination");
        assert_eq!(written.len(), data.len());
        assert!(written == data, "destination differs from blob");
        assert!(!StagingArea::for_destination(&dest).dir().exists());
        assert!(node.bus.dead_letters().is_empty());

        node.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_download_empty_blob() {
        let node = Node::start().await.expect("start node");
        let dest = node.path("empty.bin");
        node.store
            .commit_block_list(&blob_name(&dest.display().to_string()), &[])
            .await
            .expect("seed empty blob");

        let resp = node.begin_download(&dest).await.expect("begin download");
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

        node.wait_for_download(&dest).await.expect("download");
        assert_eq!(tokio::fs::metadata(&dest).await.expect("stat").len(), 0);

        node.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_refuse_existing_destination() {
        let node = Node::start().await.expect("start node");
        let dest = node.path("present.bin");
        tokio::fs::write(&dest, b"local").await.expect("write");
        node.store
            .put_blob(&blob_name(&dest.display().to_string()), Bytes::from_static(b"remote"))
            .await
            .expect("seed blob");

        let resp = node.begin_download(&dest).await.expect("begin download");
        assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);
        assert_eq!(tokio::fs::read(&dest).await.expect("read"), b"local");
        assert_eq!(node.bus.pending_count(), 0);

        node.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_report_missing_blob() {
        let node = Node::start().await.expect("start node");
        let dest = node.path("missing.bin");

        let resp = node.begin_download(&dest).await.expect("begin download");
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        let json: serde_json::Value = resp.json().await.expect("json");
        assert_eq!(json["__type"], "NotFound");
        assert!(!StagingArea::for_destination(&dest).dir().exists());

        node.shutdown().await.expect("shutdown");
    }
}
