//! Prompt composition for every completion the engine requests.
//!
//! The generated exam text is parsed by [`crate::parser`], so the markers
//! requested here ("Enunciado X:", "a)", "Respuesta:") must stay in sync with
//! the markers the parser recognizes.

use crate::error::{ExtractionError, GenerationError};
use crate::feedback::FailedQuestion;
use crate::model::{ExamParams, QuestionKind, SourceMaterial};

pub const EXAM_GENERATOR_SYSTEM: &str = "Sos un generador de exámenes";
pub const MATH_GENERATOR_SYSTEM: &str =
    "Sos un generador de ejercicios matemáticos para exámenes.";
pub const EXPLAINER_SYSTEM: &str =
    "Sos un profesor que explica brevemente por qué una respuesta es correcta en un examen.";
pub const GRADER_SYSTEM: &str = "Sos un corrector de exámenes";
pub const TUTOR_SYSTEM: &str =
    "Sos un tutor experto en ayudar a estudiantes a mejorar en exámenes.";
pub const TRANSLATOR_SYSTEM: &str =
    "Sos un traductor de frases matemáticas a consultas para Wolfram Alpha.";

/// Required opening of the holistic recommendation.
pub const HOLISTIC_LEAD_IN: &str = "Te recomendamos enfocarte en...";

/// Render the source material as the text appended to the exam prompt.
///
/// Documents must already be decoded; an empty one is rejected here, before
/// any service call is made.
pub fn source_text(source: Option<&SourceMaterial>) -> Result<String, GenerationError> {
    match source {
        Some(SourceMaterial::Document { name, text }) => {
            if text.trim().is_empty() {
                return Err(ExtractionError::Empty { name: name.clone() }.into());
            }
            Ok(text.clone())
        }
        Some(SourceMaterial::Topic { topic }) if !topic.trim().is_empty() => {
            Ok(format!("Tema: {}.", topic.trim()))
        }
        _ => Err(GenerationError::MissingSource),
    }
}

/// Build the whole-exam prompt for the keyed and open formats.
pub fn exam_prompt(params: &ExamParams, source: &str) -> String {
    let count = params.count;
    let level = &params.level;
    let extra = params
        .instructions
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!(" Instrucciones adicionales: {s}"))
        .unwrap_or_default();

    let instruction = match params.format {
        QuestionKind::Multiple => {
            let letters = params
                .option_count
                .letters()
                .iter()
                .map(char::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "Generá {count} preguntas de examen en formato opción múltiple, todas directamente \
                 relacionadas con el siguiente tema, para nivel {level}. Cada pregunta debe comenzar \
                 con 'Enunciado X: ...', incluir {n} opciones ({letters}) en líneas separadas con el \
                 formato 'a) ...', asegurando que solo una opción sea correcta y las otras sean \
                 plausibles y relacionadas con el tema (no obvias ni irrelevantes). Al final de cada \
                 pregunta, escribí: Respuesta: x. Evitá preguntas demasiado generales o de sentido \
                 común.{extra}",
                n = params.option_count.get(),
            )
        }
        QuestionKind::TrueFalse => format!(
            "Generá {count} preguntas en formato verdadero o falso, todas directamente relacionadas \
             con el siguiente tema, para nivel {level}. Cada pregunta debe comenzar con \
             'Enunciado X: Seleccionar verdadero o falso: ...', ser conceptualmente profunda y no \
             trivial, y terminar con 'Respuesta: Verdadero' o 'Respuesta: Falso'. Evitá \
             afirmaciones obvias o que no requieran conocimiento del tema.{extra}"
        ),
        QuestionKind::Open | QuestionKind::Math => format!(
            "Generá {count} preguntas de examen abiertas para que el estudiante responda \
             desarrollando, basadas en el siguiente tema, en orden aleatorio, para nivel {level}. \
             Comenzá cada una con 'Enunciado X: ...'. No incluyas opciones ni respuesta.{extra}"
        ),
    };

    format!("{instruction}\n\n{source}")
}

/// Prompt for a single math exercise on `topic`.
pub fn math_exercise_prompt(level: &str, topic: &str) -> String {
    format!(
        "Generá un ejercicio matemático de nivel {level} sobre el tema '{topic}'. El ejercicio \
         debe tener UNA sola consigna, ser claro, concreto y estar expresado como una expresión \
         matemática o pregunta directa, NO como un problema con partes a) y b). Incluí la \
         expresión matemática principal entre corchetes al final, por ejemplo: [expresión]. No \
         incluyas la solución ni la respuesta."
    )
}

/// Prompt asking why the correct answer is the right one.
pub fn explanation_prompt(statement: &str, answer: &str, correct: &str) -> String {
    format!(
        "Esta es la pregunta de examen: {statement}\n\
         El alumno respondió: {answer}\n\
         La respuesta correcta es: {correct}\n\
         Explicá en 1-2 frases, de forma breve y clara, por qué la respuesta correcta es la que \
         corresponde. No repitas el enunciado completo."
    )
}

/// Prompt asking the evaluator to judge an open answer.
pub fn evaluation_prompt(statement: &str, answer: &str) -> String {
    format!(
        "Pregunta: {statement}\n\
         Respuesta del alumno: {answer}\n\
         Evaluá si la respuesta es correcta, incorrecta o parcialmente correcta y explicá \
         brevemente por qué. Al final, decí solo CORRECTA, INCORRECTA o PARCIALMENTE CORRECTA."
    )
}

/// Prompt for the holistic recommendation over every failed question.
pub fn holistic_prompt(failed: &[FailedQuestion]) -> String {
    let mut prompt = format!(
        "Te paso una lista de preguntas que el estudiante respondió incorrectamente o \
         parcialmente, junto con su respuesta y la respuesta correcta. En base a estos errores, \
         respondé en segunda persona y comenzá tu respuesta con '{HOLISTIC_LEAD_IN}'. Sé \
         concreto, breve (2-3 frases) y no repitas el enunciado de las preguntas.\n\n\
         Preguntas falladas:\n"
    );
    for f in failed {
        prompt.push_str(&format!(
            "- Enunciado: {}\n  Respuesta del alumno: {}\n  Respuesta correcta: {}\n",
            f.statement, f.learner_answer, f.correct_answer
        ));
    }
    prompt
}

/// Prompt turning a natural-language phrase into a math-service query.
pub fn translation_prompt(phrase: &str) -> String {
    format!(
        "Convertí la siguiente frase a una consulta matemática en inglés para Wolfram Alpha. \
         No expliques, solo devolvé la consulta lista para enviar.\nFrase: {phrase}"
    )
}
