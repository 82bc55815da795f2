//! Analysis tap inserted into the decoded sample stream.
//!
//! `AnalyzingSource` wraps any `rodio::Source`, passes every sample through
//! unchanged and feeds a mono downmix to an `AnalyzerTap` one block at a time.

use std::time::Duration;

use rodio::{ChannelCount, Sample, SampleRate, Source};

use super::analyzer::AnalyzerTap;

pub struct AnalyzingSource<S> {
    inner: S,
    tap: AnalyzerTap,
    channel_count: usize,
    /// Samples left before the inner source may change its layout.
    span_left: Option<usize>,
    frame_sum: f32,
    frame_pos: usize,
    block: Vec<f32>,
}

impl<S> AnalyzingSource<S>
where
    S: Source,
{
    pub fn new(source: S, tap: AnalyzerTap) -> Self {
        let channel_count = usize::from(source.channels()).max(1);
        let span_left = source.current_span_len();
        let block = Vec::with_capacity(tap.block_len());
        Self {
            inner: source,
            tap,
            channel_count,
            span_left,
            frame_sum: 0.0,
            frame_pos: 0,
            block,
        }
    }

    /// Pick up the channel layout of the span that starts at the next sample.
    fn begin_span(&mut self) {
        let channel_count = usize::from(self.inner.channels()).max(1);
        if channel_count != self.channel_count {
            self.channel_count = channel_count;
            self.frame_sum = 0.0;
            self.frame_pos = 0;
        }
        self.span_left = self.inner.current_span_len();
    }

    fn push_sample(&mut self, sample: f32) {
        self.frame_sum += sample;
        self.frame_pos += 1;
        if self.frame_pos < self.channel_count {
            return;
        }

        self.block.push(self.frame_sum / self.channel_count as f32);
        self.frame_sum = 0.0;
        self.frame_pos = 0;

        if self.block.len() >= self.tap.block_len() {
            self.tap.process_block(&self.block);
            self.block.clear();
        }
    }
}

impl<S> Iterator for AnalyzingSource<S>
where
    S: Source,
{
    type Item = Sample;

    fn next(&mut self) -> Option<Self::Item> {
        if self.span_left == Some(0) {
            self.begin_span();
        }
        let sample = self.inner.next()?;
        if let Some(left) = self.span_left.as_mut() {
            *left = left.saturating_sub(1);
        }
        self.push_sample(sample);
        Some(sample)
    }
}

impl<S> Source for AnalyzingSource<S>
where
    S: Source,
{
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> ChannelCount {
        self.inner.channels()
    }

    fn sample_rate(&self) -> SampleRate {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}
