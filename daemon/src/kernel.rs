//! Optional kernel reinjector: a broker consumer that hands every observed
//! route to a caller-supplied publish function, for deployments where
//! brokered routes must also be programmed back into a kernel table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::error;
use route_broker::{Notice, RouteBroker};

use crate::netlink::NlRouteMessage;

const DRAIN_WAIT: Duration = Duration::from_secs(1);

/// Handle to the reinjector thread; dropping it (or calling `shutdown`)
/// stops the consumer and unregisters its broker client.
pub struct KernelClient {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KernelClient {
    pub fn spawn<F>(
        broker: &RouteBroker<NlRouteMessage>,
        mut publish: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut(&Notice<NlRouteMessage>) -> std::io::Result<()> + Send + 'static,
    {
        let broker = broker.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        let handle = thread::Builder::new()
            .name("rbroker/kernel".to_owned())
            .spawn(move || {
                let mut client = match broker.client_create("kernel") {
                    Ok(client) => client,
                    Err(err) => {
                        error!("could not register kernel client: {err}");
                        return;
                    }
                };
                while !thread_shutdown.load(Ordering::Relaxed) {
                    let Some(notice) = client.get_next_data(DRAIN_WAIT) else {
                        continue;
                    };
                    if let Err(err) = publish(&notice) {
                        client.record_error();
                        error!("kernel publish failed: {err}");
                    }
                }
            })?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("kernel client thread panicked");
            }
        }
    }
}

impl Drop for KernelClient {
    fn drop(&mut self) {
        self.stop();
    }
}
