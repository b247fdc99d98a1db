use snowflake::SnowflakeIdGenerator;


const MACHINE_ID: i32 = 1;
const NODE_ID: i32 = 1;

/// Issues the identifiers that correlate the log lines of one reconciliation cycle.
/// Ids are only unique per generator, so a long lived owner keeps one around.
pub struct CycleIdGenerator {
    generator: SnowflakeIdGenerator,
}

impl CycleIdGenerator {
    pub fn new() -> CycleIdGenerator {
        CycleIdGenerator {
            generator: SnowflakeIdGenerator::new(
                MACHINE_ID,
                NODE_ID,
            ),
        }
    }

    pub fn generate_id(&mut self) -> i64 {
        let id = self.generator.real_time_generate();
        return id;
    }
}
