//! Session management
//!
//! A [`Session`] is the plugin's whole mutable state: configuration, how to
//! find and open kernels, and at most one live [`KernelHandle`].

use tracing::info;

use crate::config::Config;
use crate::kernel::{ConnectionError, ConnectionFile, Connector, KernelClient, Resolver};
use crate::render;
use crate::surface::{DisplaySurface, SurfaceError};

/// The active kernel connection
pub struct KernelHandle {
    pub connection: ConnectionFile,
    client: Box<dyn KernelClient>,
}

/// Plugin session
pub struct Session {
    config: Config,
    resolver: Resolver,
    connector: Box<dyn Connector>,
    handle: Option<KernelHandle>,
}

impl Session {
    pub fn new(config: Config, resolver: Resolver, connector: Box<dyn Connector>) -> Self {
        Self {
            config,
            resolver,
            connector,
            handle: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check if a kernel is connected
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Connection file of the active kernel
    pub fn connection(&self) -> Option<&ConnectionFile> {
        self.handle.as_ref().map(|h| &h.connection)
    }

    /// Client of the active kernel
    pub fn client_mut(&mut self) -> Option<&mut dyn KernelClient> {
        match self.handle.as_mut() {
            Some(handle) => {
                let client: &mut dyn KernelClient = handle.client.as_mut();
                Some(client)
            }
            None => None,
        }
    }

    /// Connect to the kernel described by `spec`.
    ///
    /// The previous kernel stays active unless the new one was found and
    /// opened.
    pub fn connect(&mut self, spec: &str) -> Result<&ConnectionFile, ConnectionError> {
        let connection = self.resolver.resolve(spec)?;
        self.attach(connection)
    }

    /// Connect to the kernel named in the last-kernel record
    pub fn connect_last(&mut self) -> Result<&ConnectionFile, ConnectionError> {
        let connection = self.resolver.resolve_last()?;
        self.attach(connection)
    }

    fn attach(&mut self, connection: ConnectionFile) -> Result<&ConnectionFile, ConnectionError> {
        let client = self.connector.open(&connection)?;
        info!(
            connection = %connection.path.display(),
            kernel = connection.info.kernel_name.as_deref().unwrap_or("unknown"),
            "connected to kernel"
        );

        // Replacing the handle drops (and shuts down) the old client
        let handle = self.handle.insert(KernelHandle { connection, client });
        Ok(&handle.connection)
    }

    /// Drop the active kernel connection
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            info!(connection = %handle.connection.path.display(), "disconnected");
        }
    }

    /// Render queued kernel output; a no-op without a kernel
    pub fn refresh(&mut self, surface: &mut dyn DisplaySurface, force: bool) -> Result<bool, SurfaceError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(false);
        };
        render::refresh(handle.client.as_mut(), surface, &self.config, force)
    }
}

#[cfg(test)]
pub mod testing {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;
    use crate::kernel::client::testing::FakeConnector;

    pub const CONNECTION: &str = r#"{"ip": "127.0.0.1", "transport": "tcp", "shell_port": 1, "iopub_port": 2, "stdin_port": 3, "control_port": 4, "hb_port": 5, "key": "k", "signature_scheme": "hmac-sha256", "kernel_name": "python3"}"#;

    /// Session over a temp runtime dir holding `kernel-<id>.json` files
    pub fn session_with_kernels(ids: &[&str]) -> (Session, FakeConnector, TempDir) {
        session_with_config(ids, Config::default())
    }

    pub fn session_with_config(ids: &[&str], config: Config) -> (Session, FakeConnector, TempDir) {
        let dir = TempDir::new().unwrap();
        for id in ids {
            fs::write(dir.path().join(format!("kernel-{}.json", id)), CONNECTION).unwrap();
        }
        let resolver = Resolver::new(
            vec![dir.path().to_path_buf()],
            None,
            dir.path().join("LastKernel"),
        );
        let connector = FakeConnector::default();
        let session = Session::new(config, resolver, Box::new(connector.clone()));
        (session, connector, dir)
    }

    pub fn kernel_path(dir: &TempDir, id: &str) -> PathBuf {
        dir.path().join(format!("kernel-{}.json", id))
    }
}
