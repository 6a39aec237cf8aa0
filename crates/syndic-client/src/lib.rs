pub mod ats;
pub mod cleaner;
pub mod fetcher;

pub use ats::default_registry;
pub use cleaner::HtmdCleaner;
pub use fetcher::ReqwestFetcher;
