//! データセットの取得と整理

pub mod download;
pub mod layout;
pub mod manifest;
pub mod prepare;
pub mod subset;

pub use download::fetch_dataset;
pub use layout::{count_entries, list_subdirectories, DatasetLayout};
pub use manifest::Manifest;
pub use prepare::{prepare_data, PrepareReport};
pub use subset::{check_classes_exist, create_subset, make_rng, pick_n_random_classes};
