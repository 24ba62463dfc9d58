//! Background render thread.
//!
//! Ingestion should not wait for a full-canvas repaint. Callers hand render
//! requests to a [`RenderWorker`], which runs them on its own thread. Requests
//! that pile up while a render is in progress collapse into one: the next
//! render reads the latest grid anyway.

use crate::service::MosaicService;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

enum Request {
    Render,
    Shutdown,
}

pub struct RenderWorker {
    tx: Sender<Request>,
    handle: Option<JoinHandle<usize>>,
}

impl RenderWorker {
    pub fn spawn(service: Arc<MosaicService>) -> Self {
        let (tx, rx) = channel();
        let handle = std::thread::Builder::new()
            .name("mosaic-render".into())
            .spawn(move || run(&service, &rx))
            .ok();
        if handle.is_none() {
            error!("failed to start render thread, renders will be dropped");
        }
        Self { tx, handle }
    }

    /// Queue a render. Returns `false` if the worker is gone.
    pub fn request(&self) -> bool {
        self.tx.send(Request::Render).is_ok()
    }

    /// Finish queued work and stop. Returns the number of renders performed.
    pub fn shutdown(mut self) -> usize {
        self.stop()
    }

    fn stop(&mut self) -> usize {
        let _ = self.tx.send(Request::Shutdown);
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or(0)
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(service: &MosaicService, rx: &Receiver<Request>) -> usize {
    let mut renders = 0;
    while let Ok(request) = rx.recv() {
        if matches!(request, Request::Shutdown) {
            break;
        }
        let mut shutdown = false;
        let coalesced = rx
            .try_iter()
            .take_while(|r| {
                shutdown = matches!(r, Request::Shutdown);
                !shutdown
            })
            .count();
        if coalesced > 0 {
            debug!(coalesced, "render requests coalesced");
        }
        match service.render() {
            Ok(report) => {
                renders += 1;
                debug!(painted = report.stats.painted, "background render done");
            }
            Err(e) => error!(error = %e, "background render failed"),
        }
        if shutdown {
            break;
        }
    }
    info!(renders, "render worker stopped");
    renders
}
