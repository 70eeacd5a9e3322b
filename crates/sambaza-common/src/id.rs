use std::sync::{Mutex, OnceLock};

use snowflake::SnowflakeIdBucket;

/// 全局 Snowflake 生成器。行主键在整个平台内都由它签发，
/// 十进制字符串形式落库（SQLite TEXT 主键）。
static BUCKET: OnceLock<Mutex<SnowflakeIdBucket>> = OnceLock::new();

/// 进程启动时调用一次，绑定机器/节点标识（各 0-31）。
/// 未调用时首个 `next_id` 会以 (1, 1) 自行初始化。
pub fn init(machine_id: i32, node_id: i32) {
    let _ = BUCKET.set(Mutex::new(SnowflakeIdBucket::new(machine_id, node_id)));
}

/// 签发下一个 ID。
pub fn next_id() -> String {
    let bucket = BUCKET.get_or_init(|| Mutex::new(SnowflakeIdBucket::new(1, 1)));
    bucket.lock().unwrap().get_id().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_numeric() {
        init(1, 1);
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = next_id();
            assert!(id.parse::<i64>().is_ok(), "non-numeric id: {id}");
            assert!(seen.insert(id), "duplicate id issued");
        }
    }

    #[test]
    fn init_is_idempotent() {
        init(2, 3);
        init(4, 5);
        assert!(!next_id().is_empty());
    }
}
