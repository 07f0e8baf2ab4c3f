/// Told once a workflow's final artifact has been persisted.
///
/// Called from the workflow task; implementations marshal onto whatever
/// context presents the results.
pub trait ResultsNotifier: Send + Sync {
    fn results_ready(&self);
}
