//! B站接口访问：HTTP 客户端、收藏夹目录、播放地址解析。

pub mod catalog;
pub mod network;
pub mod playurl;
