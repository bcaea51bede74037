//! 核心宏定义
//!
//! 为配置结构体和 GPU 数据类型统一生成 `Default` 实现

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```ignore
/// struct Resolution {
///     width: u32,
///     height: u32,
/// }
///
/// impl_default!(Resolution {
///     width: 1280,
///     height: 720,
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}
