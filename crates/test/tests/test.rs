#[trellis_test::test(info)]
fn sync_test() -> Result<(), ()> {
  log::info!("sync test");
  log::trace!("filtered out at info level");

  Ok(())
}

#[trellis_test::test]
async fn async_test() -> Result<(), ()> {
  tokio::task::yield_now().await;
  log::trace!("async test");

  Ok(())
}
