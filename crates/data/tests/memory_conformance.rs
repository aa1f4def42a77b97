use gort_data::{conformance, MemoryDataAccess};

#[tokio::test]
async fn memory_backend_passes_conformance_suite() {
    let da = MemoryDataAccess::new();
    conformance::run_all(&da).await;
}
