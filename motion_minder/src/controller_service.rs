use moonraker::{MoonrakerClient, MoonrakerError};

#[async_trait::async_trait]
pub trait ControllerStatus: Send + Sync {
    async fn klippy_ready(&self) -> Result<bool, MoonrakerError>;

    async fn homed_axes(&self) -> Result<String, MoonrakerError>;
}

#[async_trait::async_trait]
impl ControllerStatus for MoonrakerClient {
    async fn klippy_ready(&self) -> Result<bool, MoonrakerError> {
        MoonrakerClient::klippy_ready(self).await
    }

    async fn homed_axes(&self) -> Result<String, MoonrakerError> {
        self.query_homed_axes().await
    }
}
