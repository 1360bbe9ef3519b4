pub mod crawler;
pub mod dispatcher;
pub mod extractor;
pub mod identity;
pub mod proxy_pool;
