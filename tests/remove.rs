#[cfg(test)]
mod common;

#[cfg(test)]
mod tests {
    use ossbulk::storage::StorageTrait;
    use ossbulk::types::error::StorageError;

    use common::*;

    use super::*;

    const OBJECT_NUM: usize = 5;
    const UPLOAD_NUM: usize = 3;

    async fn prepare(helper: &TestHelper) {
        for i in 0..OBJECT_NUM {
            helper.put_object(&format!("data/{i}.txt"), b"x").await;
        }
        for i in 0..UPLOAD_NUM {
            helper
                .storage()
                .initiate_multipart_upload(&helper.bucket, &format!("data/large{i}.bin"))
                .await
                .unwrap();
        }
        helper.put_object("other.txt", b"o").await;
    }

    #[tokio::test]
    async fn remove_objects_and_uploads_recursively() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper = TestHelper::new().await;
        prepare(&helper).await;

        let args = helper.remove_args(&["-r", "-a", "-f", &helper.bucket_url("data/")]);
        let pipeline = TestHelper::run(TestHelper::build_config(args)).await;
        assert!(!pipeline.has_error());

        let snapshot = TestHelper::remove_snapshot(&pipeline);
        assert_eq!(snapshot.object_num, OBJECT_NUM as i64);
        assert_eq!(snapshot.upload_id_num, UPLOAD_NUM as i64);
        assert_eq!(snapshot.err_num, 0);

        assert!(helper.list_keys("data/").await.is_empty());
        assert!(helper.list_upload_ids("data/").await.is_empty());
        assert!(helper.is_object_exist("other.txt").await);
    }

    #[tokio::test]
    async fn remove_objects_only() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper = TestHelper::new().await;
        prepare(&helper).await;

        let args = helper.remove_args(&["-r", "-f", &helper.bucket_url("data/")]);
        let pipeline = TestHelper::run(TestHelper::build_config(args)).await;
        assert!(!pipeline.has_error());

        let snapshot = TestHelper::remove_snapshot(&pipeline);
        assert_eq!(snapshot.object_num, OBJECT_NUM as i64);
        assert_eq!(snapshot.upload_id_num, 0);
        assert_eq!(helper.list_upload_ids("data/").await.len(), UPLOAD_NUM);
    }

    #[tokio::test]
    async fn remove_uploads_of_one_key() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper = TestHelper::new().await;
        prepare(&helper).await;
        helper
            .storage()
            .initiate_multipart_upload(&helper.bucket, "data/large0.bin.bak")
            .await
            .unwrap();

        let args = helper.remove_args(&["-m", &helper.bucket_url("data/large0.bin")]);
        let pipeline = TestHelper::run(TestHelper::build_config(args)).await;
        assert!(!pipeline.has_error());

        assert_eq!(TestHelper::remove_snapshot(&pipeline).upload_id_num, 1);
        assert_eq!(helper.list_upload_ids("data/").await.len(), UPLOAD_NUM);
        assert_eq!(helper.list_keys("data/").await.len(), OBJECT_NUM);
    }

    #[tokio::test]
    async fn remove_single_object() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper = TestHelper::new().await;
        prepare(&helper).await;

        let args = helper.remove_args(&[&helper.bucket_url("data/0.txt")]);
        let pipeline = TestHelper::run(TestHelper::build_config(args)).await;
        assert!(!pipeline.has_error());

        assert_eq!(TestHelper::remove_snapshot(&pipeline).object_num, 1);
        assert!(!helper.is_object_exist("data/0.txt").await);
        assert_eq!(helper.list_keys("data/").await.len(), OBJECT_NUM - 1);
    }

    #[tokio::test]
    async fn remove_everything_and_the_bucket() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper = TestHelper::new().await;
        prepare(&helper).await;

        let args = helper.remove_args(&["-r", "-a", "-b", "-f", &helper.bucket_url("")]);
        let pipeline = TestHelper::run(TestHelper::build_config(args)).await;
        assert!(!pipeline.has_error());

        let snapshot = TestHelper::remove_snapshot(&pipeline);
        assert_eq!(snapshot.object_num, OBJECT_NUM as i64 + 1);
        assert_eq!(snapshot.upload_id_num, UPLOAD_NUM as i64);
        assert_eq!(snapshot.removed_bucket, helper.bucket);
        assert!(!helper.storage().bucket_exists(&helper.bucket).await.unwrap());
    }

    #[tokio::test]
    async fn bucket_with_objects_is_not_removed() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper = TestHelper::new().await;
        prepare(&helper).await;

        let args = helper.remove_args(&["-b", "-f", &helper.bucket_url("")]);
        let pipeline = TestHelper::run(TestHelper::build_config(args)).await;

        assert!(pipeline.has_error());
        assert!(helper.storage().bucket_exists(&helper.bucket).await.unwrap());
        assert!(TestHelper::remove_snapshot(&pipeline).removed_bucket.is_empty());
    }

    #[tokio::test]
    async fn failed_removal_continues_with_the_next_object() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper = TestHelper::new().await;
        prepare(&helper).await;
        let faulty_storage = FaultInjectingStorage::new(
            &helper.storage_root(),
            FaultPoint::DeleteObject,
            StorageError::InvalidPart("injected".to_string()),
            1,
        );

        let args = helper.remove_args(&["-r", "-f", &helper.bucket_url("data/")]);
        let pipeline =
            TestHelper::run_with_storage(TestHelper::build_config(args), faulty_storage.boxed())
                .await;

        assert!(!pipeline.has_error());
        assert!(pipeline.has_warning());
        let snapshot = TestHelper::remove_snapshot(&pipeline);
        assert_eq!(snapshot.object_num, OBJECT_NUM as i64 - 1);
        assert_eq!(snapshot.err_object_num, 1);
        assert_eq!(faulty_storage.calls(), OBJECT_NUM as u32);
        assert_eq!(helper.list_keys("data/").await.len(), 1);
    }

    #[tokio::test]
    async fn fatal_removal_error_stops_the_batch() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper = TestHelper::new().await;
        prepare(&helper).await;
        let storage = FaultInjectingStorage::new(
            &helper.storage_root(),
            FaultPoint::DeleteObject,
            StorageError::AccessDenied("injected".to_string()),
            1,
        );

        let args = helper.remove_args(&["-r", "-f", "-j", "1", &helper.bucket_url("data/")]);
        let pipeline =
            TestHelper::run_with_storage(TestHelper::build_config(args), storage.boxed()).await;

        assert!(pipeline.has_error());
        assert_eq!(TestHelper::remove_snapshot(&pipeline).err_object_num, 1);
    }
}
