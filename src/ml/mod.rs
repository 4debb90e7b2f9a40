pub mod augmentation;
pub mod data;
pub mod inference;
pub mod ml_model;
pub mod training;

pub use augmentation::{AugmentationConfig, ImageAugmenter};
pub use data::{FoodBatch, FoodBatcher, FoodDataset, FoodItem};
pub use inference::{InferenceEngine, Prediction};
pub use ml_model::{load_and_rescale_image, FoodClassifier, ModelConfig, IMAGE_SIZE};
pub use training::{load_model_bytes, model_to_bytes, train_model, TrainingOptions, TrainingSummary};
