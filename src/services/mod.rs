pub mod proxy_service;
pub mod sas_service;
pub mod storage_service;
