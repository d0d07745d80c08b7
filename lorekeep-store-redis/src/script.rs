pub const LUA_INSERT_MESSAGES: &str = r#"
-- KEYS[1] = {tag}:messages
-- KEYS[2..] = {tag}:message:<id>
-- ARGV = payload, score, member for each message key, in the same order
local written = 0
for i = 2, #KEYS do
  local base = (i - 2) * 3
  if redis.call('SET', KEYS[i], ARGV[base + 1], 'NX') then
    redis.call('ZADD', KEYS[1], ARGV[base + 2], ARGV[base + 3])
    written = written + 1
  end
end
return written
"#;
