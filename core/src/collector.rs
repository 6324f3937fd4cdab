//! Gathers results that complete in any order into a single list.

use sockscan_common::error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const COLLECTOR_BUFFER: usize = 1024;

pub struct Collector<T> {
    sender: Option<mpsc::Sender<T>>,
    task: JoinHandle<Vec<T>>,
}

impl<T: Send + 'static> Collector<T> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(COLLECTOR_BUFFER);
        let mut collector = Self::from_receiver(receiver);
        collector.sender = Some(sender);
        collector
    }

    /// Drains a stream owned by someone else. `finish` resolves once that stream closes.
    pub fn from_receiver(mut receiver: mpsc::Receiver<T>) -> Self {
        let task = tokio::spawn(async move {
            let mut items = Vec::new();
            while let Some(item) = receiver.recv().await {
                items.push(item);
            }
            items
        });
        Self { sender: None, task }
    }

    /// A handle producers push into. Every clone must be dropped before `finish` resolves.
    pub fn sender(&self) -> Option<mpsc::Sender<T>> {
        self.sender.clone()
    }

    pub async fn finish(mut self) -> Vec<T> {
        self.sender.take();
        match self.task.await {
            Ok(items) => items,
            Err(e) => {
                error!("collector task failed: {e}");
                Vec::new()
            }
        }
    }
}

impl<T: Send + 'static> Default for Collector<T> {
    fn default() -> Self {
        Self::new()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_collect_from_many_producers() {
        let collector = Collector::new();
        let mut handles = Vec::new();
        for i in 0..10u32 {
            let tx = collector.sender().unwrap();
            handles.push(tokio::spawn(async move {
                tx.send(i).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut items = collector.finish().await;
        items.sort();
        assert_eq!(items, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn should_finish_when_external_stream_closes() {
        let (tx, rx) = mpsc::channel(4);
        let collector = Collector::from_receiver(rx);
        assert!(collector.sender().is_none());

        tx.send("a").await.unwrap();
        tx.send("b").await.unwrap();
        drop(tx);

        assert_eq!(collector.finish().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn empty_collector_should_finish_empty() {
        let collector: Collector<u8> = Collector::new();
        assert!(collector.finish().await.is_empty());
    }
}
