//! Worker boundary: the analyser loop runs on a dedicated thread that owns
//! the serial handle for its entire lifetime. Other threads talk to it only
//! through two bounded queues (requests in, responses out), so there is
//! no shared mutable state to synchronize.

use core_bitmap::Printout;
use core_protocol::Command;
use core_serial::{Analyser, AnalyserError, Transport};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

const REQUEST_CHANNEL_CAP: usize = 64;
const RESPONSE_CHANNEL_CAP: usize = 16;

/// How long the worker blocks on the request queue when there is nothing
/// else to do, so it polls the serial link periodically without busy-waiting.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Exit,
    SetPaperIn,
    SetPaperOut,
    SetPlatenIn,
    SetPlatenOut,
    RecordingStart,
    RecordingStop,
    PrintoutGet,
    PrintoutTake,
}

impl Request {
    fn command(self) -> Option<Command> {
        match self {
            Request::SetPaperIn => Some(Command::SetPaperIn),
            Request::SetPaperOut => Some(Command::SetPaperOut),
            Request::SetPlatenIn => Some(Command::SetPlatenIn),
            Request::SetPlatenOut => Some(Command::SetPlatenOut),
            Request::RecordingStart => Some(Command::RecordingStart),
            Request::RecordingStop => Some(Command::RecordingStop),
            Request::Exit | Request::PrintoutGet | Request::PrintoutTake => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Printout(Option<Printout>),
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker request queue is closed")]
    RequestChannelClosed,
    #[error("worker response queue is closed")]
    ResponseChannelClosed,
}

/// Handle to a running worker thread. Dropping it sends `Exit` and joins
/// the thread on a best-effort basis; prefer calling [`Worker::shutdown`]
/// explicitly to observe join errors.
pub struct Worker {
    handle: Option<JoinHandle<()>>,
    requests: Sender<Request>,
    responses: Receiver<Response>,
}

impl Worker {
    /// Spawn the worker thread, which takes ownership of `transport` for
    /// its entire lifetime.
    pub fn spawn(transport: Box<dyn Transport>) -> Self {
        let (req_tx, req_rx) = bounded(REQUEST_CHANNEL_CAP);
        let (resp_tx, resp_rx) = bounded(RESPONSE_CHANNEL_CAP);

        let handle = std::thread::Builder::new()
            .name("mech-analyser-worker".to_string())
            .spawn(move || run(transport, req_rx, resp_tx))
            .expect("failed to spawn analyser worker thread");

        Self {
            handle: Some(handle),
            requests: req_tx,
            responses: resp_rx,
        }
    }

    pub fn send(&self, request: Request) -> Result<(), WorkerError> {
        self.requests
            .send(request)
            .map_err(|_| WorkerError::RequestChannelClosed)
    }

    /// Block until the worker publishes its next response. Used after
    /// `PrintoutGet`/`PrintoutTake`.
    pub fn recv(&self) -> Result<Response, WorkerError> {
        self.responses
            .recv()
            .map_err(|_| WorkerError::ResponseChannelClosed)
    }

    /// Send `Exit` and join the worker thread, surfacing a thread panic if
    /// one occurred.
    pub fn shutdown(mut self) {
        let _ = self.requests.send(Request::Exit);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(target: "worker", "analyser_worker_thread_panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.requests.send(Request::Exit);
            let _ = handle.join();
        }
    }
}

fn run(transport: Box<dyn Transport>, requests: Receiver<Request>, responses: Sender<Response>) {
    let mut analyser = Analyser::new(transport);
    info!(target: "worker", "analyser_worker_started");

    loop {
        if let Err(e) = analyser.process() {
            log_process_error(&e);
        }

        match requests.try_recv() {
            Ok(request) => {
                if !handle_request(&mut analyser, &responses, request) {
                    break;
                }
            }
            Err(TryRecvError::Empty) => match requests.recv_timeout(IDLE_POLL_INTERVAL) {
                Ok(request) => {
                    if !handle_request(&mut analyser, &responses, request) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            Err(TryRecvError::Disconnected) => break,
        }
    }

    info!(target: "worker", "analyser_worker_stopped");
}

/// Returns `false` when the worker should terminate.
fn handle_request(analyser: &mut Analyser, responses: &Sender<Response>, request: Request) -> bool {
    if request == Request::Exit {
        return false;
    }

    if let Some(command) = request.command() {
        if let Err(e) = analyser.send(command) {
            warn!(target: "worker", error = %e, "command_send_failed");
        }
        return true;
    }

    let snapshot = match request {
        Request::PrintoutGet => analyser.get_printout(),
        Request::PrintoutTake => analyser.take_printout(),
        _ => unreachable!("Exit and command requests are handled above"),
    };
    let _ = responses.send(Response::Printout(snapshot));
    true
}

fn log_process_error(e: &AnalyserError) {
    warn!(target: "worker", error = %e, "analyser_process_error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_serial::InMemoryTransport;

    #[test]
    fn printout_get_on_empty_builder_returns_none() {
        let worker = Worker::spawn(Box::new(InMemoryTransport::new()));
        worker.send(Request::PrintoutGet).unwrap();
        match worker.recv().unwrap() {
            Response::Printout(p) => assert!(p.is_none()),
        }
        worker.shutdown();
    }

    #[test]
    fn exit_request_terminates_the_worker_thread() {
        let worker = Worker::spawn(Box::new(InMemoryTransport::new()));
        worker.send(Request::Exit).unwrap();
        // shutdown() sends a second Exit and joins; the worker must
        // tolerate a request queue that already asked it to stop.
        worker.shutdown();
    }

    #[test]
    fn set_paper_in_request_does_not_publish_a_response() {
        let worker = Worker::spawn(Box::new(InMemoryTransport::new()));
        worker.send(Request::SetPaperIn).unwrap();
        worker.send(Request::PrintoutGet).unwrap();
        // The first response seen must correspond to PrintoutGet, proving
        // SetPaperIn did not enqueue one of its own.
        match worker.recv().unwrap() {
            Response::Printout(p) => assert!(p.is_none()),
        }
        worker.shutdown();
    }
}
