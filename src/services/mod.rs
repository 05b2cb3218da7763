pub mod batch_store;
