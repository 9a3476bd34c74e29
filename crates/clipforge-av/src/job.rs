//! Job descriptions and their rendering into ffmpeg invocations.
//!
//! A [`JobSpec`] is built once per request through one of the kind-specific
//! constructors, which validate their inputs. It is immutable afterwards and
//! renders into one or more [`Stage`]s, each a single ffmpeg invocation.

use crate::probe::ProbeResult;
use crate::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Background audio level used when the request gives none.
pub const DEFAULT_AUDIO_LEVEL: u8 = 50;

/// The five supported job kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Concatenate several audio files into one mp3.
    ConcatAudio,
    /// Mix a second audio track into a video's own audio.
    MergeVideoAudioMix,
    /// Concatenate two or more videos.
    ConcatVideos,
    /// Cut a start+duration range out of one video.
    Trim,
    /// Loop background audio to the video's length and mix it in.
    MergeVideoBackgroundAudio,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ConcatAudio => "concat_audio",
            JobKind::MergeVideoAudioMix => "merge_video_audio_mix",
            JobKind::ConcatVideos => "concat_videos",
            JobKind::Trim => "trim",
            JobKind::MergeVideoBackgroundAudio => "merge_video_background_audio",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of the background-audio job, derived from both probes.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundAudio {
    pub video_duration: f64,
    pub audio_duration: f64,
    /// Total plays of the audio needed to cover the video.
    pub loop_count: u32,
    /// Linear gain applied to the background track.
    pub volume: f64,
    /// Intermediate file holding the looped, truncated audio.
    pub looped: PathBuf,
}

/// Kind-specific job parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum JobParams {
    ConcatAudio,
    MergeVideoAudioMix { offset: Duration },
    ConcatVideos,
    /// `duration` is a length, not an absolute end time.
    Trim { start: String, duration: String },
    MergeVideoBackgroundAudio(BackgroundAudio),
}

/// A fully validated, immutable job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    kind: JobKind,
    inputs: Vec<PathBuf>,
    params: JobParams,
    output: PathBuf,
}

/// One ffmpeg invocation within a job.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// Short label used in logs and errors.
    pub name: &'static str,
    /// Arguments after the common engine prefix.
    pub args: Vec<String>,
    /// File this stage writes.
    pub output: PathBuf,
}

impl JobSpec {
    /// Concatenate `inputs` (upload order) into one audio file.
    pub fn concat_audio(inputs: Vec<PathBuf>, output: PathBuf) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::InvalidInput(
                "at least one audio input is required".to_string(),
            ));
        }
        Ok(Self {
            kind: JobKind::ConcatAudio,
            inputs,
            params: JobParams::ConcatAudio,
            output,
        })
    }

    /// Mix `audio`, delayed by `offset`, into the audio of `video`.
    pub fn merge_video_audio(
        video: PathBuf,
        audio: PathBuf,
        offset: Duration,
        output: PathBuf,
    ) -> Self {
        Self {
            kind: JobKind::MergeVideoAudioMix,
            inputs: vec![video, audio],
            params: JobParams::MergeVideoAudioMix { offset },
            output,
        }
    }

    /// Concatenate two or more videos in upload order.
    pub fn concat_videos(inputs: Vec<PathBuf>, output: PathBuf) -> Result<Self> {
        if inputs.len() < 2 {
            return Err(Error::InvalidInput(
                "at least two video inputs are required".to_string(),
            ));
        }
        Ok(Self {
            kind: JobKind::ConcatVideos,
            inputs,
            params: JobParams::ConcatVideos,
            output,
        })
    }

    /// Extract `duration` starting at `start` from `input`.
    ///
    /// Both values are passed to ffmpeg verbatim, so anything ffmpeg accepts
    /// as a time (`5`, `00:00:05.5`) works.
    pub fn trim(input: PathBuf, start: &str, duration: &str, output: PathBuf) -> Result<Self> {
        let start = start.trim();
        let duration = duration.trim();
        if start.is_empty() || duration.is_empty() {
            return Err(Error::InvalidInput(
                "trim needs both a start time and a duration".to_string(),
            ));
        }
        Ok(Self {
            kind: JobKind::Trim,
            inputs: vec![input],
            params: JobParams::Trim {
                start: start.to_string(),
                duration: duration.to_string(),
            },
            output,
        })
    }

    /// Loop `audio` to cover `video` and mix it in at `audio_level` percent.
    pub fn merge_background_audio(
        video: PathBuf,
        audio: PathBuf,
        video_probe: ProbeResult,
        audio_probe: ProbeResult,
        audio_level: u8,
        looped: PathBuf,
        output: PathBuf,
    ) -> Result<Self> {
        let video_duration = video_probe.duration_seconds;
        let audio_duration = audio_probe.duration_seconds;
        if !is_positive(video_duration) || !is_positive(audio_duration) {
            return Err(Error::InvalidInput(format!(
                "durations must be positive (video {video_duration}, audio {audio_duration})"
            )));
        }

        Ok(Self {
            kind: JobKind::MergeVideoBackgroundAudio,
            inputs: vec![video, audio],
            params: JobParams::MergeVideoBackgroundAudio(BackgroundAudio {
                video_duration,
                audio_duration,
                loop_count: loop_count(video_duration, audio_duration),
                volume: volume_for_level(audio_level),
                looped,
            }),
            output,
        })
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn params(&self) -> &JobParams {
        &self.params
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Render the job into the ffmpeg invocations that run it, in order.
    pub fn stages(&self) -> Vec<Stage> {
        match &self.params {
            JobParams::ConcatAudio => {
                let n = self.inputs.len();
                let labels: String = (0..n).map(|i| format!("[{i}:a:0]")).collect();
                let mut args = input_args(&self.inputs);
                args.extend([
                    "-filter_complex".to_string(),
                    format!("{labels}concat=n={n}:v=0:a=1[aout]"),
                    "-map".to_string(),
                    "[aout]".to_string(),
                    path_arg(&self.output),
                ]);
                vec![self.single_stage("concat", args)]
            }
            JobParams::MergeVideoAudioMix { offset } => {
                let ms = offset.as_millis();
                let mut args = input_args(&self.inputs);
                args.extend([
                    "-filter_complex".to_string(),
                    format!("[1:a]adelay={ms}|{ms}[a1];[0:a][a1]amix=inputs=2[aout]"),
                ]);
                args.extend(copy_video_mapped_audio());
                args.push(path_arg(&self.output));
                vec![self.single_stage("mix", args)]
            }
            JobParams::ConcatVideos => {
                let n = self.inputs.len();
                let labels: String = (0..n).map(|i| format!("[{i}:v:0][{i}:a:0]")).collect();
                let mut args = input_args(&self.inputs);
                args.extend([
                    "-filter_complex".to_string(),
                    format!("{labels}concat=n={n}:v=1:a=1[vout][aout]"),
                    "-map".to_string(),
                    "[vout]".to_string(),
                    "-map".to_string(),
                    "[aout]".to_string(),
                    path_arg(&self.output),
                ]);
                vec![self.single_stage("concat", args)]
            }
            JobParams::Trim { start, duration } => {
                let mut args = input_args(&self.inputs);
                args.extend([
                    "-ss".to_string(),
                    start.clone(),
                    "-t".to_string(),
                    duration.clone(),
                    path_arg(&self.output),
                ]);
                vec![self.single_stage("trim", args)]
            }
            JobParams::MergeVideoBackgroundAudio(bg) => {
                let loop_args = vec![
                    "-stream_loop".to_string(),
                    (bg.loop_count - 1).to_string(),
                    "-t".to_string(),
                    bg.video_duration.to_string(),
                    "-i".to_string(),
                    path_arg(&self.inputs[1]),
                    path_arg(&bg.looped),
                ];

                let mut mix_args = input_args(&[self.inputs[0].clone(), bg.looped.clone()]);
                mix_args.extend([
                    "-filter_complex".to_string(),
                    format!(
                        "[1:a]volume={}[bg];[0:a][bg]amix=inputs=2:duration=first[aout]",
                        bg.volume
                    ),
                ]);
                mix_args.extend(copy_video_mapped_audio());
                mix_args.push(path_arg(&self.output));

                vec![
                    Stage {
                        name: "loop",
                        args: loop_args,
                        output: bg.looped.clone(),
                    },
                    self.single_stage("mix", mix_args),
                ]
            }
        }
    }

    fn single_stage(&self, name: &'static str, args: Vec<String>) -> Stage {
        Stage {
            name,
            args,
            output: self.output.clone(),
        }
    }
}

fn is_positive(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn input_args(inputs: &[PathBuf]) -> Vec<String> {
    inputs
        .iter()
        .flat_map(|p| ["-i".to_string(), path_arg(p)])
        .collect()
}

fn copy_video_mapped_audio() -> [String; 8] {
    [
        "-map", "0:v", "-map", "[aout]", "-c:v", "copy", "-c:a", "aac",
    ]
    .map(String::from)
}

/// How many plays of the audio cover the whole video. Always at least one.
pub fn loop_count(video_duration: f64, audio_duration: f64) -> u32 {
    let plays = (video_duration / audio_duration).ceil();
    if plays.is_finite() && plays >= 1.0 {
        plays as u32
    } else {
        1
    }
}

/// Linear gain for a 0-100 level; levels above 100 are clamped.
pub fn volume_for_level(level: u8) -> f64 {
    f64::from(level.min(100)) / 100.0
}

/// Read an audio level form value.
///
/// Absent or non-numeric values give [`DEFAULT_AUDIO_LEVEL`]; fractional
/// values are truncated and the result is clamped to 0..=100.
pub fn parse_audio_level(raw: Option<&str>) -> u8 {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEFAULT_AUDIO_LEVEL;
    };

    let value = raw
        .parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64));

    match value {
        Some(v) => v.clamp(0, 100) as u8,
        None => DEFAULT_AUDIO_LEVEL,
    }
}

/// Read an audio offset in seconds.
///
/// Absent, negative, non-numeric or unrepresentably large values give zero.
pub fn parse_offset(raw: Option<&str>) -> Duration {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn probe(secs: f64) -> ProbeResult {
        ProbeResult {
            duration_seconds: secs,
        }
    }

    #[test]
    fn concat_audio_filter_covers_all_inputs_in_order() {
        let spec =
            JobSpec::concat_audio(vec![p("/u/a.mp3"), p("/u/b.wav"), p("/u/c.ogg")], p("/o/out.mp3"))
                .unwrap();
        let stages = spec.stages();
        assert_eq!(stages.len(), 1);
        assert_eq!(
            stages[0].args,
            vec![
                "-i", "/u/a.mp3", "-i", "/u/b.wav", "-i", "/u/c.ogg",
                "-filter_complex", "[0:a:0][1:a:0][2:a:0]concat=n=3:v=0:a=1[aout]",
                "-map", "[aout]", "/o/out.mp3",
            ]
        );
        assert_eq!(stages[0].output, p("/o/out.mp3"));
    }

    #[test]
    fn concat_audio_requires_an_input() {
        let err = JobSpec::concat_audio(vec![], p("/o/out.mp3")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn merge_video_audio_copies_video_and_delays_audio() {
        let spec = JobSpec::merge_video_audio(
            p("/u/v.mp4"),
            p("/u/a.mp3"),
            Duration::from_millis(1500),
            p("/o/m.mp4"),
        );
        assert_eq!(spec.kind(), JobKind::MergeVideoAudioMix);
        let args = &spec.stages()[0].args;
        assert!(args.contains(&"[1:a]adelay=1500|1500[a1];[0:a][a1]amix=inputs=2[aout]".to_string()));
        let joined = args.join(" ");
        assert!(joined.contains("-map 0:v -map [aout] -c:v copy -c:a aac /o/m.mp4"));
    }

    #[test]
    fn merge_video_audio_default_offset_is_zero() {
        let spec = JobSpec::merge_video_audio(p("v"), p("a"), parse_offset(None), p("o"));
        assert!(spec.stages()[0].args[5].starts_with("[1:a]adelay=0|0"));
    }

    #[test]
    fn concat_videos_needs_two() {
        assert!(JobSpec::concat_videos(vec![p("/u/one.mp4")], p("/o/x.mp4")).is_err());

        let spec = JobSpec::concat_videos(vec![p("/u/1.mp4"), p("/u/2.mp4")], p("/o/x.mp4")).unwrap();
        let args = &spec.stages()[0].args;
        assert!(args.contains(&"[0:v:0][0:a:0][1:v:0][1:a:0]concat=n=2:v=1:a=1[vout][aout]".to_string()));
        assert_eq!(args.last().unwrap(), "/o/x.mp4");
    }

    #[test]
    fn trim_uses_start_plus_duration() {
        let spec = JobSpec::trim(p("/u/clip.mp4"), "5", "10", p("/o/trimmed_clip.mp4")).unwrap();
        assert_eq!(
            spec.stages()[0].args,
            vec!["-i", "/u/clip.mp4", "-ss", "5", "-t", "10", "/o/trimmed_clip.mp4"]
        );
        assert_eq!(
            spec.params(),
            &JobParams::Trim {
                start: "5".into(),
                duration: "10".into()
            }
        );
    }

    #[test]
    fn trim_rejects_blank_times() {
        assert!(JobSpec::trim(p("v"), " ", "10", p("o")).is_err());
        assert!(JobSpec::trim(p("v"), "0", "", p("o")).is_err());
    }

    #[test]
    fn background_audio_loops_and_truncates() {
        let spec = JobSpec::merge_background_audio(
            p("/u/v.mp4"),
            p("/u/a.mp3"),
            probe(20.0),
            probe(6.0),
            DEFAULT_AUDIO_LEVEL,
            p("/u/looped.mp3"),
            p("/o/out.mp4"),
        )
        .unwrap();

        let JobParams::MergeVideoBackgroundAudio(bg) = spec.params() else {
            panic!("wrong params");
        };
        assert_eq!(bg.loop_count, 4);
        assert_eq!(bg.volume, 0.5);

        let stages = spec.stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].name, "loop");
        assert_eq!(
            stages[0].args,
            vec!["-stream_loop", "3", "-t", "20", "-i", "/u/a.mp3", "/u/looped.mp3"]
        );
        assert_eq!(stages[0].output, p("/u/looped.mp3"));

        assert_eq!(stages[1].name, "mix");
        let mix = stages[1].args.join(" ");
        assert!(mix.starts_with("-i /u/v.mp4 -i /u/looped.mp3"));
        assert!(mix.contains("[1:a]volume=0.5[bg];[0:a][bg]amix=inputs=2:duration=first[aout]"));
        assert_eq!(stages[1].output, p("/o/out.mp4"));
    }

    #[test]
    fn background_audio_rejects_zero_duration() {
        let err = JobSpec::merge_background_audio(
            p("v"),
            p("a"),
            probe(10.0),
            probe(0.0),
            50,
            p("l"),
            p("o"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn loop_count_edges() {
        assert_eq!(loop_count(20.0, 6.0), 4);
        assert_eq!(loop_count(18.0, 6.0), 3);
        assert_eq!(loop_count(3.0, 10.0), 1);
        assert_eq!(loop_count(10.0, 0.0), 1);
    }

    #[test]
    fn audio_level_parsing() {
        assert_eq!(parse_audio_level(None), 50);
        assert_eq!(parse_audio_level(Some("")), 50);
        assert_eq!(parse_audio_level(Some("loud")), 50);
        assert_eq!(parse_audio_level(Some("75")), 75);
        assert_eq!(parse_audio_level(Some(" 30.9 ")), 30);
        assert_eq!(parse_audio_level(Some("0")), 0);
        assert_eq!(parse_audio_level(Some("250")), 100);
        assert_eq!(parse_audio_level(Some("-5")), 0);
    }

    #[test]
    fn volume_for_levels() {
        assert_eq!(volume_for_level(50), 0.5);
        assert_eq!(volume_for_level(100), 1.0);
        assert_eq!(volume_for_level(0), 0.0);
        assert_eq!(volume_for_level(200), 1.0);
    }

    #[test]
    fn offset_parsing() {
        assert_eq!(parse_offset(Some("1.5")), Duration::from_millis(1500));
        assert_eq!(parse_offset(Some("-2")), Duration::ZERO);
        assert_eq!(parse_offset(Some("soon")), Duration::ZERO);
        assert_eq!(parse_offset(Some("inf")), Duration::ZERO);
        assert_eq!(parse_offset(Some("1e30")), Duration::ZERO);
        assert_eq!(parse_offset(None), Duration::ZERO);
    }

    #[test]
    fn kind_names() {
        assert_eq!(JobKind::Trim.to_string(), "trim");
        assert_eq!(JobKind::ConcatAudio.as_str(), "concat_audio");
    }
}
