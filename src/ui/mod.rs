//! 交互层入口：标准输入输出的命令行提示。

pub mod noui;
