use super::*;
use std::collections::VecDeque;

enum Step {
    Data(Vec<u8>),
    Block,
    Interrupt,
}

/// Byte source replaying a script; end-of-input once exhausted
struct Scripted(VecDeque<Step>);

impl Scripted {
    fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self(steps.into_iter().collect())
    }

    fn text(text: &str) -> Self {
        Self::new([Step::Data(text.as_bytes().to_vec())])
    }
}

impl Read for Scripted {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.pop_front() {
            None => Ok(0),
            Some(Step::Block) => Err(io::ErrorKind::WouldBlock.into()),
            Some(Step::Interrupt) => Err(io::ErrorKind::Interrupted.into()),
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.0.push_front(Step::Data(data.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}

#[derive(Default)]
struct Recorder {
    urls: Vec<String>,
    next: u64,
}

impl Submitter for Recorder {
    fn submit(&mut self, url: &str) -> Result<TransferId, SubmitError> {
        if url.starts_with("bad") {
            return Err(SubmitError::InvalidUrl {
                url: url.to_string(),
                reason: "scripted".to_string(),
            });
        }
        self.urls.push(url.to_string());
        self.next += 1;
        Ok(TransferId(self.next))
    }
}

fn config(batch_limit: usize, max_token_len: usize) -> IntakeConfig {
    IntakeConfig {
        batch_limit,
        max_token_len,
        ..IntakeConfig::default()
    }
}

fn tokens<R: Read>(reader: &mut TokenReader<R>) -> Vec<Token> {
    let mut out = Vec::new();
    loop {
        let token = reader.next_token().unwrap();
        let stop = token == Token::EndOfInput;
        out.push(token);
        if stop {
            return out;
        }
    }
}

#[test]
fn test_splits_on_any_ascii_whitespace() {
    let mut reader = TokenReader::new(Scripted::text("  a\tb\n\nc\r\nd "), 1023);
    assert_eq!(
        tokens(&mut reader),
        vec![
            Token::Url("a".into()),
            Token::Url("b".into()),
            Token::Url("c".into()),
            Token::Url("d".into()),
            Token::EndOfInput,
        ]
    );
}

#[test]
fn test_partial_token_survives_would_block() {
    let mut reader = TokenReader::new(
        Scripted::new([
            Step::Data(b"http://exa".to_vec()),
            Step::Block,
            Step::Data(b"mple.test/ next".to_vec()),
        ]),
        1023,
    );

    assert_eq!(reader.next_token().unwrap(), Token::WouldBlock);
    assert_eq!(
        reader.next_token().unwrap(),
        Token::Url("http://example.test/".into())
    );
    // The trailing token is flushed at end-of-input.
    assert_eq!(reader.next_token().unwrap(), Token::Url("next".into()));
    assert_eq!(reader.next_token().unwrap(), Token::EndOfInput);
}

#[test]
fn test_interrupted_reads_are_retried() {
    let mut reader = TokenReader::new(
        Scripted::new([Step::Interrupt, Step::Data(b"one ".to_vec())]),
        1023,
    );
    assert_eq!(reader.next_token().unwrap(), Token::Url("one".into()));
}

#[test]
fn test_oversized_token_is_truncated_once() {
    let long = format!("http://example.test/{}", "x".repeat(2000));
    let input = format!("{long} http://example.test/short");
    let mut reader = TokenReader::new(Scripted::text(&input), 1023);

    let first = reader.next_token().unwrap();
    match first {
        Token::Url(url) => {
            assert_eq!(url.len(), 1023);
            assert_eq!(url, long[..1023]);
        }
        other => panic!("unexpected token: {other:?}"),
    }
    assert_eq!(
        reader.next_token().unwrap(),
        Token::Url("http://example.test/short".into())
    );
}

#[test]
fn test_truncation_spanning_read_chunks() {
    // Longer than one read chunk, so the discard continues across reads.
    let long = "y".repeat(READ_CHUNK * 2 + 17);
    let mut reader = TokenReader::new(Scripted::text(&format!("{long}\nz")), 8);
    assert_eq!(reader.next_token().unwrap(), Token::Url("yyyyyyyy".into()));
    assert_eq!(reader.next_token().unwrap(), Token::Url("z".into()));
}

#[test]
fn test_oversized_token_produces_one_submission() {
    let long = format!("http://example.test/{}", "x".repeat(1500));
    let mut intake = JobIntake::new(Scripted::text(&long), &config(120, 1023));
    let mut recorder = Recorder::default();

    let report = intake.run_batch(&mut recorder).unwrap();
    assert_eq!(report.submitted, 1);
    assert_eq!(recorder.urls.len(), 1);
    assert_eq!(recorder.urls[0].len(), 1023);
}

#[test]
fn test_batch_limit_leaves_remaining_tokens_for_next_batch() {
    let input: String = (0..5).map(|i| format!("http://example.test/{i}\n")).collect();
    let mut intake = JobIntake::new(Scripted::text(&input), &config(2, 1023));
    let mut recorder = Recorder::default();

    let first = intake.run_batch(&mut recorder).unwrap();
    assert_eq!(first.end, BatchEnd::Saturated);
    assert_eq!(first.submitted, 2);

    let second = intake.run_batch(&mut recorder).unwrap();
    assert_eq!(second.end, BatchEnd::Saturated);

    let third = intake.run_batch(&mut recorder).unwrap();
    assert_eq!(third.end, BatchEnd::EndOfInput);
    assert_eq!(third.submitted, 1);

    let expected: Vec<String> = (0..5).map(|i| format!("http://example.test/{i}")).collect();
    assert_eq!(recorder.urls, expected);
}

#[test]
fn test_refused_tokens_are_skipped_and_counted() {
    let mut intake = JobIntake::new(
        Scripted::text("http://example.test/a bad-token http://example.test/b"),
        &config(120, 1023),
    );
    let mut recorder = Recorder::default();

    let report = intake.run_batch(&mut recorder).unwrap();
    assert_eq!(report.submitted, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.end, BatchEnd::EndOfInput);
}

#[test]
fn test_would_block_ends_batch_as_drained() {
    let mut intake = JobIntake::new(
        Scripted::new([Step::Data(b"http://example.test/a\n".to_vec()), Step::Block]),
        &config(120, 1023),
    );
    let mut recorder = Recorder::default();

    let report = intake.run_batch(&mut recorder).unwrap();
    assert_eq!(report.end, BatchEnd::Drained);
    assert_eq!(report.submitted, 1);
}

#[test]
fn test_end_of_input_is_not_an_error() {
    let mut intake = JobIntake::new(Scripted::new([]), &config(120, 1023));
    let mut recorder = Recorder::default();

    for _ in 0..2 {
        let report = intake.run_batch(&mut recorder).unwrap();
        assert_eq!(report.end, BatchEnd::EndOfInput);
        assert_eq!(report.submitted, 0);
    }
}

#[test]
fn test_invalid_utf8_is_replaced_not_fatal() {
    let mut reader = TokenReader::new(
        Scripted::new([Step::Data(vec![b'a', 0xff, b'b', b' '])]),
        1023,
    );
    assert_eq!(reader.next_token().unwrap(), Token::Url("a\u{fffd}b".into()));
}
