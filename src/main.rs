fn main() -> anyhow::Result<()> {
    assignment_grader_lib::run()
}
