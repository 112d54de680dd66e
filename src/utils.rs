/// Rounds `value` up to the next multiple of `multiple`.
pub fn multiple_of(mut value: u32, multiple: u32) -> u32 {
    let remainder = value % multiple;
    if remainder != 0 {
        value += multiple - remainder;
    }

    value
}
