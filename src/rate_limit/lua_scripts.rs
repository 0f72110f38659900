/// Lua script for fixed window counting in Redis
///
/// Increments the counter and attaches the window expiry only when the key
/// is created, all in one atomic step. A key found without any expiry (left
/// behind by an interrupted writer) gets one; an existing expiry is never
/// moved, otherwise a busy client would keep its window open forever.
///
/// KEYS[1] = the window key
/// ARGV[1] = window duration (milliseconds)
///
/// Returns: the counter value after this increment
pub const FIXED_WINDOW_INCREMENT_SCRIPT: &str = r#"
local key = KEYS[1]
local window_ms = tonumber(ARGV[1])

local current = redis.call('INCR', key)

if current == 1 then
    redis.call('PEXPIRE', key, window_ms)
elseif redis.call('PTTL', key) == -1 then
    redis.call('PEXPIRE', key, window_ms)
end

return current
"#;
