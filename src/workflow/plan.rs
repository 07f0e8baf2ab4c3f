//! Splitting a level-sorted registry snapshot into phases

use crate::{actor::message::RegisteredWorker, domain::worker::WorkerMode};

/// Workers of one run, grouped by phase and in execution order
#[derive(Debug, Clone, Default)]
pub struct PhasePlan {
    /// Sequential workers below or above the final tier, ascending level
    pub sequential: Vec<RegisteredWorker>,
    pub parallel:   Vec<RegisteredWorker>,
    /// Sequential workers at the final tier, ascending registration order
    pub final_tier: Vec<RegisteredWorker>
}

impl PhasePlan {
    /// `workers` must already be sorted by level, ties by registration order.
    pub fn from_workers(workers: Vec<RegisteredWorker>, final_tier_level: u32) -> Self {
        let mut plan = PhasePlan::default();
        for worker in workers {
            match worker.info.mode {
                WorkerMode::Parallel => plan.parallel.push(worker),
                WorkerMode::Sequential if worker.info.level == final_tier_level => plan.final_tier.push(worker),
                WorkerMode::Sequential => plan.sequential.push(worker)
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.sequential.is_empty() && self.parallel.is_empty() && self.final_tier.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sequential.len() + self.parallel.len() + self.final_tier.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        domain::worker::WorkerInfo,
        protocol::{WorkerConnection, connection::tests::tcp_pair}
    };

    async fn worker(name: &str, level: u32, mode: WorkerMode, sequence: u64) -> (RegisteredWorker, tokio::net::TcpStream) {
        let (server, client) = tcp_pair().await;
        let info = WorkerInfo {
            address: server.peer_addr().unwrap(),
            name: name.to_string(),
            level,
            mode,
            registered_at: Utc::now(),
            sequence
        };
        (RegisteredWorker { info, connection: WorkerConnection::new(server) }, client)
    }

    fn names(workers: &[RegisteredWorker]) -> Vec<&str> {
        workers.iter().map(|w| w.info.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_plan_splits_by_mode_and_final_tier() {
        let mut sorted = Vec::new();
        let mut clients = Vec::new();
        for (i, (name, level, mode)) in [
            ("Cleaner", 1, WorkerMode::Sequential),
            ("Tokenizer", 2, WorkerMode::Sequential),
            ("Model1", 5, WorkerMode::Parallel),
            ("Model2", 5, WorkerMode::Parallel),
            ("Validator", 6, WorkerMode::Sequential),
            ("Predictor", 8, WorkerMode::Sequential),
            ("Scorer", 8, WorkerMode::Parallel)
        ]
        .into_iter()
        .enumerate()
        {
            let (w, c) = worker(name, level, mode, i as u64).await;
            sorted.push(w);
            clients.push(c);
        }

        let plan = PhasePlan::from_workers(sorted, 8);
        assert_eq!(names(&plan.sequential), ["Cleaner", "Tokenizer", "Validator"]);
        assert_eq!(names(&plan.parallel), ["Model1", "Model2", "Scorer"]);
        assert_eq!(names(&plan.final_tier), ["Predictor"]);
        assert_eq!(plan.len(), 7);
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let plan = PhasePlan::from_workers(Vec::new(), 8);
        assert!(plan.is_empty());
    }
}
