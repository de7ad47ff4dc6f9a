use super::Drivers;

#[async_trait::async_trait]
pub trait Driver: Send + Sync {
    /// Returns once the application stop notification fires.
    async fn run(&self) -> ();

    fn get_driver_type(&self) -> Drivers;
}
