mod collection_workflow;
mod helpers;
