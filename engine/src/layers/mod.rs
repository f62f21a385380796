mod euclidean_loss;
mod inner_product;
mod memory_data;

pub use euclidean_loss::EuclideanLoss;
pub use inner_product::InnerProduct;
pub use memory_data::MemoryData;
