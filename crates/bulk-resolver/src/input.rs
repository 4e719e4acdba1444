use std::collections::VecDeque;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Split};
use tokio::time::timeout;

/// What `Hostnames::next` found.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Next {
    Name(String),
    /// Nothing arrived in time, but there may be more later.
    Idle,
    /// The input is exhausted.
    End,
}

/// Whitespace-separated hostnames from a reader, which may be slow:
/// a pipe being fed by another program, say.
pub struct Hostnames<R> {
    lines: Split<R>,
    pending: VecDeque<String>,
    ended: bool,
}

impl<R: AsyncBufRead + Unpin> Hostnames<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.split(b'\n'),
            pending: VecDeque::new(),
            ended: false,
        }
    }

    /// The next hostname, waiting at most `wait` for one to turn up.
    /// A partly-read line is kept across an `Idle`.
    ///
    /// # Errors
    ///
    /// If reading fails.
    pub async fn next(&mut self, wait: Duration) -> io::Result<Next> {
        loop {
            if let Some(name) = self.pending.pop_front() {
                return Ok(Next::Name(name));
            }
            if self.ended {
                return Ok(Next::End);
            }

            match timeout(wait, self.lines.next_segment()).await {
                Ok(Ok(Some(line))) => self.pending.extend(
                    line.split(u8::is_ascii_whitespace)
                        .filter(|token| !token.is_empty())
                        .map(|token| String::from_utf8_lossy(token).into_owned()),
                ),
                Ok(Ok(None)) => self.ended = true,
                Ok(Err(error)) => return Err(error),
                Err(_) => return Ok(Next::Idle),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncWriteExt, BufReader};

    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn splits_on_any_whitespace() {
        let input: &[u8] = b"  example.com\twww.example.com\n\n  example.net  \r\nlast";
        let mut hostnames = Hostnames::new(input);

        assert_eq!(Next::Name("example.com".to_string()), hostnames.next(WAIT).await.unwrap());
        assert_eq!(Next::Name("www.example.com".to_string()), hostnames.next(WAIT).await.unwrap());
        assert_eq!(Next::Name("example.net".to_string()), hostnames.next(WAIT).await.unwrap());
        assert_eq!(Next::Name("last".to_string()), hostnames.next(WAIT).await.unwrap());
        assert_eq!(Next::End, hostnames.next(WAIT).await.unwrap());
        assert_eq!(Next::End, hostnames.next(WAIT).await.unwrap());
    }

    #[tokio::test]
    async fn empty_input_ends() {
        let mut hostnames = Hostnames::new(&b""[..]);

        assert_eq!(Next::End, hostnames.next(WAIT).await.unwrap());
    }

    #[tokio::test]
    async fn slow_input_is_idle() {
        let (reader, mut writer) = tokio::io::duplex(64);
        let mut hostnames = Hostnames::new(BufReader::new(reader));

        assert_eq!(Next::Idle, hostnames.next(WAIT).await.unwrap());

        writer.write_all(b"exam").await.unwrap();
        assert_eq!(Next::Idle, hostnames.next(WAIT).await.unwrap());

        writer.write_all(b"ple.com\n").await.unwrap();
        assert_eq!(Next::Name("example.com".to_string()), hostnames.next(WAIT).await.unwrap());

        drop(writer);
        assert_eq!(Next::End, hostnames.next(WAIT).await.unwrap());
    }
}
