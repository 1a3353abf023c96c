/// Where `LEER` takes its lines from. Any iterator of strings works, so tests
/// can hand over a `Vec<String>` directly. Programs run on their own thread,
/// hence `Send`.
pub trait InputSource: Send {
    /// Next line without its line terminator, `None` once exhausted.
    fn read_line(&mut self) -> Option<String>;
}

impl<I: Iterator<Item = String> + Send> InputSource for I {
    fn read_line(&mut self) -> Option<String> {
        self.next()
            .map(|line| line.trim_end_matches(['\r', '\n']).to_string())
    }
}
