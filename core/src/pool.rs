//! Fixed-size pool of async workers with panic isolation.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sockscan_common::{debug, error};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type SharedQueue = Arc<Mutex<mpsc::Receiver<Task>>>;

pub struct WorkerPool {
    queue: Option<mpsc::Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    stop: CancellationToken,
}

impl WorkerPool {
    /// Starts `size` workers pulling from a queue that holds up to `buffer` tasks.
    pub fn new(size: usize, buffer: usize) -> Self {
        let (queue, receiver) = mpsc::channel::<Task>(buffer.max(1));
        let receiver: SharedQueue = Arc::new(Mutex::new(receiver));
        let stop = CancellationToken::new();

        let workers = (0..size.max(1))
            .map(|id| tokio::spawn(worker_loop(id, receiver.clone(), stop.clone())))
            .collect();

        Self {
            queue: Some(queue),
            workers,
            stop,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues `task`, waiting while the queue is full.
    ///
    /// Returns `false` if the pool no longer accepts work.
    pub async fn submit<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.queue {
            Some(queue) => queue.send(Box::pin(task)).await.is_ok(),
            None => false,
        }
    }

    /// Stops intake, lets the workers finish everything already queued and waits for them.
    pub async fn join(&mut self) {
        self.queue.take();
        self.wait_workers().await;
    }

    /// Stops intake and dequeuing. Workers exit after their current task and
    /// whatever is still queued is dropped unrun.
    pub async fn close(&mut self) {
        self.queue.take();
        self.stop.cancel();
        self.wait_workers().await;
    }

    // Handles are popped only after they resolve, so a dropped `join` can be
    // followed by `close` without losing track of any worker.
    async fn wait_workers(&mut self) {
        while let Some(worker) = self.workers.last_mut() {
            if let Err(e) = worker.await {
                error!("worker task failed: {e}");
            }
            self.workers.pop();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn worker_loop(id: usize, queue: SharedQueue, stop: CancellationToken) {
    loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => None,
            task = next_task(&queue) => task,
        };
        let Some(task) = next else {
            debug!("worker {id} exiting");
            return;
        };

        // Running the task on its own turns a panic into a JoinError instead
        // of taking the worker down with it.
        if let Err(e) = tokio::spawn(task).await {
            report_failure(id, e);
        }
    }
}

async fn next_task(queue: &SharedQueue) -> Option<Task> {
    queue.lock().await.recv().await
}

fn report_failure(id: usize, e: JoinError) {
    if e.is_panic() {
        error!("worker {id} recovered from panic: {}", panic_message(e.into_panic()));
    } else {
        error!("worker {id} task was cancelled");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
