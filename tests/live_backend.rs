//! Integration tests against a real storage server.
//!
//! These tests require a reachable backend and an account with write access:
//! IMGUPLOAD_TEST_URL, IMGUPLOAD_TEST_USER, IMGUPLOAD_TEST_PASSWORD and
//! IMGUPLOAD_TEST_DIR (a scratch directory the account may write to).
//!
//! Run with: cargo test --features integ_test --test live_backend

#[cfg(feature = "integ_test")]
mod tests {
    use std::io::Write;

    use imgupload::storage::{Credentials, UploadClient};

    struct Live {
        client: UploadClient,
        dir: String,
    }

    fn live() -> Option<Live> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let (Some(url), Some(user), Some(password), Some(dir)) = (
            var("IMGUPLOAD_TEST_URL"),
            var("IMGUPLOAD_TEST_USER"),
            var("IMGUPLOAD_TEST_PASSWORD"),
            var("IMGUPLOAD_TEST_DIR"),
        ) else {
            eprintln!("Skipping test: IMGUPLOAD_TEST_* not set");
            return None;
        };

        let otp = var("IMGUPLOAD_TEST_OTP");
        let client = UploadClient::new(&url, Credentials::new(&user, &password, otp)).ok()?;
        Some(Live { client, dir: dir.trim_end_matches('/').to_string() })
    }

    #[tokio::test]
    async fn test_login() {
        let Some(live) = live() else { return };
        let token = live.client.authenticate().await.expect("transport");
        assert!(token.is_some(), "credentials were rejected");
    }

    #[tokio::test]
    async fn test_mkdir_then_upload() {
        let Some(live) = live() else { return };
        let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
        let dir = format!("{}/imgupload-test-{stamp}", live.dir);

        assert!(live.client.create_directory(&dir).await.expect("transport"));

        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "imgupload live test {stamp}").unwrap();

        let reply = live
            .client
            .upload_local_file(file.path(), &format!("{dir}/probe.txt"))
            .await
            .expect("transport")
            .expect("authenticated");
        assert!(reply.is_success(), "backend refused upload: {} {}", reply.code, reply.message);
    }
}
