use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Russian stopwords stripped before any similarity or sentiment check.
const RU_STOP: &str = "и в во не что он на я с со как а то все она так его но да ты к у же вы за бы по \
только ее мне было вот от меня еще нет о из ему теперь когда даже ну вдруг ли если \
уже или ни быть был него до вас нибудь опять уж вам ведь там потом себя ничего ей \
может они тут где есть надо ней для мы тебя их чем была сам чтоб без будто чего раз \
тоже себе под будет ж тогда кто этот того потому этого какой совсем ним здесь этом \
один почти мой тем чтобы нее сейчас были куда зачем всех никогда можно при наконец два \
об другой";

/// Stems that mark a complaining text.
const NEG_WORDS: &[&str] = &[
    "плох", "ужас", "отврат", "работает", "слом", "сломал", "сломалась", "брак", "возврат",
    "советую", "разочар", "подошел", "дешев", "хлипк", "воняет", "запах",
];

/// Stems that mark a praising text.
const POS_WORDS: &[&str] = &[
    "отлич", "супер", "класс", "понравилось", "рекомендую", "качеств", "хороший", "красив",
    "удобн",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static STOP: OnceLock<HashSet<&'static str>> = OnceLock::new();
    STOP.get_or_init(|| RU_STOP.split_whitespace().collect())
}

/// Lowercase, strip everything but Latin/Cyrillic letters, digits and
/// dashes, drop two-letter scraps and stopwords.
pub fn tokenize(text: &str) -> Vec<String> {
    static CLEAN: OnceLock<Regex> = OnceLock::new();
    let clean = CLEAN.get_or_init(|| Regex::new(r"[^a-zа-я0-9\s-]").expect("valid pattern"));

    let lowered = text.to_lowercase();
    let cleaned = clean.replace_all(&lowered, " ");
    cleaned
        .split_whitespace()
        .map(|word| word.trim_matches('-'))
        .filter(|word| word.chars().count() > 2)
        .filter(|word| !stopwords().contains(word))
        .map(str::to_string)
        .collect()
}

/// k-token shingles; shorter inputs degrade to the token set itself.
pub fn shingles(tokens: &[String], k: usize) -> HashSet<String> {
    if tokens.len() < k {
        return tokens.iter().cloned().collect();
    }
    tokens.windows(k).map(|window| window.join(" ")).collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        inter as f64 / union as f64
    }
}

pub fn has_negative(text: &str) -> bool {
    let tokens: HashSet<String> = tokenize(text).into_iter().collect();
    NEG_WORDS.iter().any(|word| tokens.contains(*word))
}

pub fn has_positive(text: &str) -> bool {
    let tokens: HashSet<String> = tokenize(text).into_iter().collect();
    POS_WORDS.iter().any(|word| tokens.contains(*word))
}
